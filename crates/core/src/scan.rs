//! Scan session coordination: classifies decoded codes, gates lookups, and
//! stops/starts the capture stream around them.
//!
//! ```text
//!            EAN-13 (978/979)                 result delivered
//!   Idle ───────────────────────▶ AwaitingResult ────────────────▶ Paused
//!    │ ▲                                                             │
//!    │ └──────────────────────── resume() ◀──────────────────────────┘
//!    └─────────────── QR ───────────────────────────────────────────▶ Paused
//! ```
//!
//! Only `Idle` accepts detections. The collaborator decides when to leave
//! `Paused` by calling [`ScanCoordinator::resume`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Url;

use crate::error::LookupError;
use crate::isbn::{self, BookIdentifier};
use crate::links::extract_links;
use crate::lookup::{CatalogProvider, CatalogQueryResult};

/// Barcode/QR encoding a decoded string came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbology {
    Qr,
    Ean13,
    Other(String),
}

impl Symbology {
    /// Maps a decoder's type label (`qr`, `QRCode`, `ean13`, `EAN-13`, `org.gs1.EAN-13`, ...).
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .rsplit('.')
            .next()
            .unwrap_or(label)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "qr" | "qrcode" => Symbology::Qr,
            "ean13" => Symbology::Ean13,
            _ => Symbology::Other(label.to_string()),
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbology::Qr => f.write_str("QR"),
            Symbology::Ean13 => f.write_str("EAN-13"),
            Symbology::Other(label) => f.write_str(label),
        }
    }
}

/// One decoded code from the capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub symbology: Symbology,
    pub payload: String,
}

impl Detection {
    pub fn new(symbology: Symbology, payload: impl Into<String>) -> Self {
        Self {
            symbology,
            payload: payload.into(),
        }
    }

    pub fn qr(payload: impl Into<String>) -> Self {
        Self::new(Symbology::Qr, payload)
    }

    pub fn ean13(payload: impl Into<String>) -> Self {
        Self::new(Symbology::Ean13, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Accepting detections.
    Idle,
    /// A result is with the collaborator; waiting for [`ScanCoordinator::resume`].
    Paused,
    /// A catalog lookup is in flight.
    AwaitingResult,
}

/// What happened to a detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    QrDelivered,
    LookupStarted,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not `Idle`: a lookup is outstanding or a result is being shown.
    Busy,
    /// Late event from a stream that has already been stopped.
    CaptureStopped,
    /// EAN-13 payload that is not a 978/979 book identifier.
    NotBookland,
    UnsupportedSymbology,
}

/// The capture stream (camera or any other decoded-code source).
pub trait CaptureControl: Send + Sync {
    fn start_capture(&self);
    fn stop_capture(&self);
}

/// The presentation collaborator.
pub trait ScanObserver: Send + Sync {
    fn on_qr(&self, text: &str, links: Vec<Url>);
    /// Called exactly once per lookup, from the catalog's completion context.
    fn on_book(&self, result: Result<BookIdentifier, LookupError>);
}

struct Gate {
    state: ScanState,
    capturing: bool,
    current: Option<BookIdentifier>,
}

struct Shared {
    gate: Mutex<Gate>,
    /// Held across a `capturing` change and the matching capture call, so the
    /// stream and the flag cannot be reordered. Always taken before `gate`.
    capture_order: Mutex<()>,
    catalog: Arc<dyn CatalogProvider>,
    capture: Arc<dyn CaptureControl>,
    observer: Arc<dyn ScanObserver>,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capture_order(&self) -> MutexGuard<'_, ()> {
        self.capture_order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, mut book: BookIdentifier, result: CatalogQueryResult) {
        let result = result.map(|item| book.attach_catalog_item(item));
        {
            let mut gate = self.gate();
            if gate.state != ScanState::AwaitingResult {
                tracing::warn!(isbn = book.digits(), state = ?gate.state, "dropping stray catalog result");
                return;
            }
            gate.state = ScanState::Paused;
            gate.current = Some(book.clone());
        }
        match result {
            Ok(()) => {
                tracing::info!(isbn = book.digits(), title = ?book.title(), "catalog lookup finished");
                self.observer.on_book(Ok(book));
            }
            Err(e) => {
                tracing::info!(isbn = book.digits(), "catalog lookup failed: {}", e);
                self.observer.on_book(Err(e));
            }
        }
    }
}

/// Owns the scan gate. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ScanCoordinator {
    shared: Arc<Shared>,
}

impl ScanCoordinator {
    /// Starts in `Idle` with capture not yet running; call [`start`](Self::start).
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        capture: Arc<dyn CaptureControl>,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: Mutex::new(Gate {
                    state: ScanState::Idle,
                    capturing: false,
                    current: None,
                }),
                capture_order: Mutex::new(()),
                catalog,
                capture,
                observer,
            }),
        }
    }

    pub fn state(&self) -> ScanState {
        self.shared.gate().state
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.gate().capturing
    }

    /// The most recently accepted book, with catalog fields once they arrive.
    pub fn current_book(&self) -> Option<BookIdentifier> {
        self.shared.gate().current.clone()
    }

    /// Starts capture if idle and not already running. Returns whether it started.
    pub fn start(&self) -> bool {
        let _order = self.shared.capture_order();
        {
            let mut gate = self.shared.gate();
            if gate.capturing || gate.state != ScanState::Idle {
                return false;
            }
            gate.capturing = true;
        }
        tracing::debug!("capture started");
        self.shared.capture.start_capture();
        true
    }

    /// Stops capture if running. Does not cancel an in-flight lookup.
    pub fn stop(&self) -> bool {
        let _order = self.shared.capture_order();
        {
            let mut gate = self.shared.gate();
            if !gate.capturing {
                return false;
            }
            gate.capturing = false;
        }
        tracing::debug!("capture stopped");
        self.shared.capture.stop_capture();
        true
    }

    /// The collaborator is done with the last result: back to `Idle` and restart
    /// capture. Has no effect while a lookup is outstanding.
    pub fn resume(&self) -> bool {
        {
            let mut gate = self.shared.gate();
            match gate.state {
                ScanState::AwaitingResult => return false,
                ScanState::Paused | ScanState::Idle => gate.state = ScanState::Idle,
            }
        }
        self.start();
        true
    }

    /// Routes a batch of detections in order.
    pub fn on_detections<I>(&self, detections: I) -> Vec<DetectionOutcome>
    where
        I: IntoIterator<Item = Detection>,
    {
        detections
            .into_iter()
            .map(|d| self.on_detection(d))
            .collect()
    }

    /// Classifies one detection and, if the gate is open, acts on it.
    pub fn on_detection(&self, detection: Detection) -> DetectionOutcome {
        let Detection { symbology, payload } = detection;
        let order = self.shared.capture_order();
        let accepted = {
            let mut gate = self.shared.gate();
            if gate.state != ScanState::Idle {
                return DetectionOutcome::Ignored(IgnoreReason::Busy);
            }
            if !gate.capturing {
                return DetectionOutcome::Ignored(IgnoreReason::CaptureStopped);
            }
            let accepted = match symbology {
                Symbology::Qr => {
                    gate.state = ScanState::Paused;
                    None
                }
                Symbology::Ean13 => match isbn::validate(&payload).filter(BookIdentifier::is_bookland) {
                    Some(book) => {
                        gate.state = ScanState::AwaitingResult;
                        gate.current = Some(book.clone());
                        Some(book)
                    }
                    None => {
                        tracing::debug!(payload = %payload, "ignoring non-book EAN-13");
                        return DetectionOutcome::Ignored(IgnoreReason::NotBookland);
                    }
                },
                Symbology::Other(ref label) => {
                    tracing::debug!(symbology = %label, "ignoring unsupported symbology");
                    return DetectionOutcome::Ignored(IgnoreReason::UnsupportedSymbology);
                }
            };
            gate.capturing = false;
            accepted
        };
        self.shared.capture.stop_capture();
        // observers and completions may call back into start/resume
        drop(order);

        match accepted {
            None => {
                let links = extract_links(&payload);
                tracing::info!(links = links.len(), "QR code scanned");
                self.shared.observer.on_qr(&payload, links);
                DetectionOutcome::QrDelivered
            }
            Some(book) => {
                tracing::info!(isbn = book.digits(), provider = self.shared.catalog.name(), "starting catalog lookup");
                let shared = Arc::clone(&self.shared);
                let digits = book.digits().to_string();
                self.shared.catalog.fetch(
                    &digits,
                    Box::new(move |result| shared.complete(book, result)),
                );
                DetectionOutcome::LookupStarted
            }
        }
    }
}

impl fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.shared.gate();
        f.debug_struct("ScanCoordinator")
            .field("state", &gate.state)
            .field("capturing", &gate.capturing)
            .field("provider", &self.shared.catalog.name())
            .finish()
    }
}
