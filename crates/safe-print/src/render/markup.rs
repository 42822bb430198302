//! Markdown notes to sanitized HTML

use pulldown_cmark::{html, Options, Parser};

use super::RenderError;

/// Turns entry notes into an HTML fragment
pub trait Markup: Send + Sync {
    fn to_html(&self, text: &str) -> Result<String, RenderError>;
}

/// CommonMark with tables and strikethrough, passed through ammonia
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMark;

impl Markup for CommonMark {
    fn to_html(&self, text: &str) -> Result<String, RenderError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut out = String::with_capacity(text.len() * 2);
        html::push_html(&mut out, Parser::new_ext(text, options));

        Ok(ammonia::clean(&out))
    }
}
