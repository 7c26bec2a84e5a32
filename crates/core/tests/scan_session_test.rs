//! End-to-end scan session: coordinator + real HTTP provider + mock catalog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bookscan_core::config::CatalogConfig;
use bookscan_core::error::LookupError;
use bookscan_core::isbn::BookIdentifier;
use bookscan_core::lookup::rakuten::RakutenBooksProvider;
use bookscan_core::scan::{CaptureControl, Detection, DetectionOutcome, ScanCoordinator, ScanObserver, ScanState};
use reqwest::Url;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CountingCapture {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl CaptureControl for CountingCapture {
    fn start_capture(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_capture(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct ChannelObserver(mpsc::UnboundedSender<Result<BookIdentifier, LookupError>>);

impl ScanObserver for ChannelObserver {
    fn on_qr(&self, _text: &str, _links: Vec<Url>) {}

    fn on_book(&self, result: Result<BookIdentifier, LookupError>) {
        let _ = self.0.send(result);
    }
}

#[tokio::test]
async fn burst_of_detections_yields_one_request_and_one_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("isbn", "9784798140628"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    br#"{"Items":[{"Item":{"title":"T","itemUrl":"https://example.test/x"}}]}"#.to_vec(),
                    "application/json",
                )
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = CatalogConfig::new("test-app").with_endpoint(format!("{}/search", server.uri()));
    let provider = Arc::new(RakutenBooksProvider::new(&config, Handle::current()).unwrap());
    let capture = Arc::new(CountingCapture::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let coordinator = ScanCoordinator::new(provider, capture.clone(), Arc::new(ChannelObserver(tx)));
    coordinator.start();

    let outcomes = coordinator.on_detections((0..25).map(|_| Detection::ean13("9784798140628")));
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == DetectionOutcome::LookupStarted)
            .count(),
        1
    );
    assert_eq!(coordinator.state(), ScanState::AwaitingResult);

    let book = rx.recv().await.unwrap().unwrap();
    assert_eq!(book.title(), Some("T"));
    assert_eq!(
        book.marketplace_url_secondary().map(Url::as_str),
        Some("https://example.test/x")
    );
    assert_eq!(coordinator.state(), ScanState::Paused);
    assert!(rx.try_recv().is_err());

    assert!(coordinator.resume());
    assert_eq!(capture.starts.load(Ordering::SeqCst), 2);
    assert_eq!(capture.stops.load(Ordering::SeqCst), 1);
}
