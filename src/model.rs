//! Domain model for a render request.
//!
//! This is the shape the pipeline, memoizer and hash operate on. Serialization
//! of these types is the canonical byte form used for cache keys: camelCase
//! keys in declaration order, absent optional fields omitted. Changing field
//! order or names invalidates every cached entry.

use serde::Serialize;

/// Width and height of the output paper, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Page margins in inches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMargin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
}

/// Inclusive range of pages to print, serialized as "start-end" on the wire
/// to the browser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Per-item print options. Every field is optional; the browser's defaults
/// apply where a field is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<PageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<PageMargin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<PageRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_html: Option<String>,
}

/// One HTML fragment to render into the merged document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderItem {
    pub body_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ItemConfig>,
}

/// Where the merged artifact goes and how long its URL stays cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    pub directory: String,
    pub file_name: String,
    pub public_url_prefix: String,
    /// Cache TTL in seconds; 0 means the entry never expires.
    pub expiration: u64,
}

/// A complete, validated render request. Immutable after construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub items: Vec<RenderItem>,
    pub config: GeneralConfig,
}
