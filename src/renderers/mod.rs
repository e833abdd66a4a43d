// plan-pdf-service/src/renderers/mod.rs

mod engine;
mod html;
mod pdf;

pub use engine::SharedEngine;
pub use html::HtmlRenderer;
pub use pdf::{ChromeRenderer, PdfRenderer};
