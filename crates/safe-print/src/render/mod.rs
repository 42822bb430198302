//! Document rendering
//!
//! Turns a [`Sheet`] into one self-contained HTML page. Barcodes are inlined
//! as data URIs and the stylesheet and print script are embedded, so the
//! returned bytes are all a browser needs.
//!
//! Rendering is all-or-nothing: every collaborator call happens before the
//! page is assembled, and the first failure aborts the whole document.

pub mod barcode;
pub mod markup;
pub mod sheet;

use bytes::Bytes;
use maud::{html, Markup as Html, PreEscaped, DOCTYPE};
use thiserror::Error;
use tracing::debug;

pub use barcode::{Barcode, DataMatrixPng};
pub use markup::{CommonMark, Markup};
pub use sheet::{Sheet, SheetItem};

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Markup rendering failed: {0}")]
    Markup(String),

    #[error("Barcode rendering failed: {0}")]
    Barcode(String),

    #[error("Section '{title}': {source}")]
    Section {
        title: String,
        #[source]
        source: Box<RenderError>,
    },
}

/// The finished page, held in memory only
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    bytes: Bytes,
}

impl RenderedDocument {
    pub const CONTENT_TYPE: &'static str = "text/html; charset=utf-8";

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle to the same bytes
    pub fn body(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<String> for RenderedDocument {
    fn from(html: String) -> Self {
        Self {
            bytes: Bytes::from(html),
        }
    }
}

impl std::fmt::Debug for RenderedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Renders sheets with injected markup and barcode collaborators
pub struct Renderer {
    markup: Box<dyn Markup>,
    barcode: Box<dyn Barcode>,
    barcode_scale: u32,
}

impl Renderer {
    pub fn new(barcode_scale: u32) -> Self {
        Self::with_collaborators(Box::new(CommonMark), Box::new(DataMatrixPng), barcode_scale)
    }

    pub fn with_collaborators(
        markup: Box<dyn Markup>,
        barcode: Box<dyn Barcode>,
        barcode_scale: u32,
    ) -> Self {
        Self {
            markup,
            barcode,
            barcode_scale,
        }
    }

    pub fn render(&self, sheet: &Sheet) -> Result<RenderedDocument, RenderError> {
        let store = self.prepare(&sheet.store)?;
        let items = sheet
            .items
            .iter()
            .map(|item| self.prepare(item))
            .collect::<Result<Vec<_>, _>>()?;

        let page = page(&sheet.created, &store, &items).into_string();
        debug!(sections = items.len() + 1, bytes = page.len(), "document rendered");

        Ok(RenderedDocument::from(page))
    }

    fn prepare<'a>(&self, item: &'a SheetItem) -> Result<Section<'a>, RenderError> {
        let wrap = |source| RenderError::Section {
            title: item.title.clone(),
            source: Box::new(source),
        };

        let description = self.markup.to_html(&item.description).map_err(wrap)?;
        let barcode = if item.password.is_empty() {
            None
        } else {
            Some(
                self.barcode
                    .data_uri(&item.password, self.barcode_scale)
                    .map_err(wrap)?,
            )
        };

        Ok(Section {
            item,
            description,
            barcode,
        })
    }
}

/// A sheet item with its collaborator output resolved
struct Section<'a> {
    item: &'a SheetItem,
    description: String,
    barcode: Option<String>,
}

const STYLE: &str = r#"
.ins { padding: 8px; }
.barcode { padding: 16px; }
table { break-inside: avoid; width: 100%; }
td { vertical-align: top; }
label { font-weight: bold; }
.value { overflow-wrap: anywhere; font-family: monospace; margin-left: 8px; }
th.top { border-top: 3px solid black; }
td.left { width: 35%; }
td.right { border-left: 1px solid grey; }
"#;

// Print on load; once the dialog is done, release the server and the window.
const PRINT_SCRIPT: &str = r#"
window.onafterprint = function() {
    fetch("./close", { method: "post" }).finally(function() {
        window.close();
    });
};
window.print();
"#;

fn page(created: &str, store: &Section<'_>, items: &[Section<'_>]) -> Html {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (store.item.title) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                h1 { "Created " (created) }
                (section(store))
                @for item in items {
                    (section(item))
                }
                script { (PreEscaped(PRINT_SCRIPT)) }
            }
        }
    }
}

fn section(section: &Section<'_>) -> Html {
    let item = section.item;
    html! {
        table {
            tr {
                th.top colspan="2" { (item.title) }
            }
            tr {
                td.left {
                    @if !item.username.is_empty() {
                        div { label { "Username:" } " " div.value { (item.username) } }
                    }
                    @if !item.password.is_empty() {
                        div { label { "Password:" } " " div.value { (item.password) } }
                    }
                    @if let Some(uri) = &section.barcode {
                        img.barcode src=(uri) alt="Data Matrix";
                    }
                }
                td.right {
                    div.ins { (PreEscaped(&section.description)) }
                    @if !item.url.is_empty() {
                        div { label { "URL:" } " " div.value { (item.url) } }
                    }
                }
            }
        }
    }
}
