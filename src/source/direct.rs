use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Configuration;

/// Random-photo service; every request is a brand new URL.
#[derive(Debug, Clone)]
pub struct DirectSource {
    base: String,
    width: u32,
    height: u32,
    grayscale: bool,
    blur: Option<u8>,
}

impl DirectSource {
    pub fn from_config(cfg: &Configuration) -> Self {
        let mut base = cfg.repository_config.path.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            base,
            width: cfg.width,
            height: cfg.height,
            grayscale: cfg.grayscale,
            blur: cfg.blur.then(|| cfg.blur_amount.clamp(1, 10)),
        }
    }

    pub fn next_url(&self) -> String {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.url_with_stamp(stamp)
    }

    /// `<base><width>/<height>/?grayscale&blur=<n>&<stamp>`.
    ///
    /// A blur of 1 is the service default and is sent as a bare `blur` flag.
    pub fn url_with_stamp(&self, stamp: u128) -> String {
        let mut params: Vec<String> = Vec::with_capacity(3);
        if self.grayscale {
            params.push("grayscale".to_string());
        }
        match self.blur {
            Some(amount) if amount > 1 => params.push(format!("blur={amount}")),
            Some(_) => params.push("blur".to_string()),
            None => {}
        }
        params.push(stamp.to_string());
        format!(
            "{}{}/{}/?{}",
            self.base,
            self.width,
            self.height,
            params.join("&")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(yaml: &str) -> DirectSource {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        DirectSource::from_config(&cfg.validated().unwrap())
    }

    #[test]
    fn plain_url_only_carries_the_stamp() {
        let src = source("width: 800\nheight: 600");
        assert_eq!(src.url_with_stamp(42), "https://picsum.photos/800/600/?42");
    }

    #[test]
    fn grayscale_and_blur_flags() {
        let src = source("grayscale: true\nblur: true\nblur-amount: 4");
        assert_eq!(
            src.url_with_stamp(7),
            "https://picsum.photos/1920/1080/?grayscale&blur=4&7"
        );
        let src = source("blur: true");
        assert_eq!(src.url_with_stamp(7), "https://picsum.photos/1920/1080/?blur&7");
    }

    #[test]
    fn blur_amount_is_clamped() {
        let src = source("blur: true\nblur-amount: 55");
        assert_eq!(src.url_with_stamp(1), "https://picsum.photos/1920/1080/?blur=10&1");
    }

    #[test]
    fn custom_base_gets_trailing_slash() {
        let src = source("repository-config:\n  path: http://localhost:9000/img");
        assert_eq!(src.url_with_stamp(3), "http://localhost:9000/img/1920/1080/?3");
    }

    #[test]
    fn consecutive_urls_differ() {
        let src = source("{}");
        let first = src.url_with_stamp(1);
        let second = src.url_with_stamp(2);
        assert_ne!(first, second);
    }
}
