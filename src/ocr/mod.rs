//! Text recognition.
//!
//! The recognizer is an external capability: it takes a preprocessed page
//! image and returns (region, text, confidence) triples. Tesseract is the
//! bundled backend and is driven through its command-line interface.

mod backend;
mod tesseract;

pub use backend::{
    create_recognizer, RecognitionError, RecognizerBackend, RecognizerConfig, TextRecognizer,
};
pub use tesseract::TesseractRecognizer;
