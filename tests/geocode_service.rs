use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use random_photo::config::GeocoderConfig;
use random_photo::geocode::Geocoder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Behavior {
    Paris,
    ServerError,
    Garbage,
    NoAddress,
    Slow,
}

#[derive(Clone)]
struct Service {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
}

async fn reverse(
    State(svc): State<Service>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    svc.hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(params.get("format").map(String::as_str), Some("json"));
    assert_eq!(params.get("zoom").map(String::as_str), Some("10"));
    assert_eq!(params.get("addressdetails").map(String::as_str), Some("1"));
    assert!(params.contains_key("lat") && params.contains_key("lon"));
    match svc.behavior {
        Behavior::Paris => (
            [("content-type", "application/json")],
            r#"{"address":{"city":"Paris","state":"Île-de-France","country":"France"}}"#,
        )
            .into_response(),
        Behavior::ServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Behavior::Garbage => ([("content-type", "application/json")], "not json").into_response(),
        Behavior::NoAddress => ([("content-type", "application/json")], "{}").into_response(),
        Behavior::Slow => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            StatusCode::OK.into_response()
        }
    }
}

async fn serve(behavior: Behavior) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/reverse", get(reverse)).with_state(Service {
        behavior,
        hits: hits.clone(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn geocoder(addr: SocketAddr, timeout: Duration) -> Geocoder {
    Geocoder::new(&GeocoderConfig {
        endpoint: format!("http://{addr}/reverse"),
        timeout,
        ..GeocoderConfig::default()
    })
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nearby_coordinates_share_one_request() {
    let (addr, hits) = serve(Behavior::Paris).await;
    let mut geo = geocoder(addr, Duration::from_secs(5));

    let first = geo.reverse_geocode(48.85661, 2.35222).await;
    let second = geo.reverse_geocode(48.85690, 2.35179).await;
    assert_eq!(first, "Paris, Île-de-France, France");
    assert_eq!(second, first);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(geo.cached_locations(), 1);

    geo.reverse_geocode(40.7128, -74.0060).await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_errors_fall_back_and_are_not_cached() {
    let (addr, hits) = serve(Behavior::ServerError).await;
    let mut geo = geocoder(addr, Duration::from_secs(5));

    assert_eq!(geo.reverse_geocode(48.8566, 2.3522).await, "48.8566, 2.3522");
    assert_eq!(geo.reverse_geocode(48.8566, 2.3522).await, "48.8566, 2.3522");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(geo.cached_locations(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unparseable_or_empty_answers_fall_back() {
    let (addr, _) = serve(Behavior::Garbage).await;
    let mut geo = geocoder(addr, Duration::from_secs(5));
    assert_eq!(geo.reverse_geocode(-33.86882, 151.20929).await, "-33.8688, 151.2093");

    let (addr, _) = serve(Behavior::NoAddress).await;
    let mut geo = geocoder(addr, Duration::from_secs(5));
    assert_eq!(geo.reverse_geocode(0.5, 0.25).await, "0.5000, 0.2500");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_service_times_out_to_fallback() {
    let (addr, _) = serve(Behavior::Slow).await;
    let mut geo = geocoder(addr, Duration::from_millis(200));

    let started = std::time::Instant::now();
    let name = tokio::time::timeout(Duration::from_secs(2), geo.reverse_geocode(1.0, 2.0))
        .await
        .expect("geocoder did not honor its timeout");
    assert_eq!(name, "1.0000, 2.0000");
    assert!(started.elapsed() < Duration::from_secs(2));
}
