//! Ingress request types and validation.
//!
//! The wire format mirrors the public API: `bodyHTML`, `headerHTML` and
//! `footerHTML` keep their historical capitalization, named paper sizes are
//! resolved to inches here, and every validation failure is reported as
//! `Field '<path>': <reason>` with the full nested path so a client can fix
//! the exact offending field.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::Error;
use crate::model;

/// Named paper sizes accepted on the wire, resolved to width x height inches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PaperSize {
    pub fn dimensions(self) -> model::PageSize {
        let (width, height) = match self {
            PaperSize::Letter => (8.5, 11.0),
            PaperSize::Legal => (8.5, 14.0),
            PaperSize::Tabloid => (11.0, 17.0),
            PaperSize::Ledger => (17.0, 11.0),
            PaperSize::A0 => (33.1, 46.8),
            PaperSize::A1 => (23.4, 33.1),
            PaperSize::A2 => (16.5, 23.4),
            PaperSize::A3 => (11.7, 16.5),
            PaperSize::A4 => (8.27, 11.7),
            PaperSize::A5 => (5.875, 8.25),
            PaperSize::A6 => (4.125, 5.875),
        };
        model::PageSize { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageMarginRequest {
    #[validate(range(min = 0.0, message = "Value must be greater than or equal to 0"))]
    pub top: Option<f64>,
    #[validate(range(min = 0.0, message = "Value must be greater than or equal to 0"))]
    pub bottom: Option<f64>,
    #[validate(range(min = 0.0, message = "Value must be greater than or equal to 0"))]
    pub left: Option<f64>,
    #[validate(range(min = 0.0, message = "Value must be greater than or equal to 0"))]
    pub right: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_page_range))]
pub struct PageRangeRequest {
    #[serde(default)]
    #[validate(range(min = 1, message = "Value must be greater than or equal to 1"))]
    pub start: u32,
    #[serde(default)]
    #[validate(range(min = 1, message = "Value must be greater than or equal to 1"))]
    pub end: u32,
}

fn validate_page_range(range: &PageRangeRequest) -> Result<(), ValidationError> {
    if range.end < range.start {
        return Err(ValidationError::new("gtefield")
            .with_message("Value must be greater than or equal to start".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemConfigRequest {
    pub orientation: Option<Orientation>,
    pub display_header_footer: Option<bool>,
    pub print_background: Option<bool>,
    #[validate(range(min = 0.1, max = 2.0, message = "Value must be between 0.1 and 2"))]
    pub scale: Option<f64>,
    pub size: Option<PaperSize>,
    #[validate(nested)]
    pub margin: Option<PageMarginRequest>,
    #[validate(nested)]
    pub page_ranges: Option<PageRangeRequest>,
    #[serde(rename = "headerHTML")]
    pub header_html: Option<String>,
    #[serde(rename = "footerHTML")]
    pub footer_html: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PdfItemRequest {
    #[serde(rename = "bodyHTML", default)]
    #[validate(length(min = 1, message = "This field is required"))]
    pub body_html: String,
    #[validate(nested)]
    pub config: Option<ItemConfigRequest>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfigRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required"))]
    pub directory: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required"))]
    pub file_name: String,
    #[serde(rename = "publicURLPrefix", default)]
    #[validate(custom(function = validate_http_url))]
    pub public_url_prefix: String,
    /// Cache TTL in seconds; absent means no expiration.
    pub expiration: Option<u64>,
}

fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("http_url").with_message("Must be a valid http(s) URL".into()))
    }
}

/// Complete request body for `POST /api/v1/pdf/url`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePdfUrlRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required"), nested)]
    pub items: Vec<PdfItemRequest>,
    #[serde(default)]
    #[validate(nested)]
    pub config: GeneralConfigRequest,
}

impl GeneratePdfUrlRequest {
    /// Run field validation and flatten failures to user-facing messages.
    pub fn validated(self) -> Result<Self, Error> {
        match self.validate() {
            Ok(()) => Ok(self),
            Err(errors) => {
                let mut messages = Vec::new();
                flatten_errors("", &errors, &mut messages);
                messages.sort();
                Err(Error::Validation(messages))
            }
        }
    }

    /// Convert the validated request into the domain model.
    pub fn into_model(self) -> model::RenderRequest {
        let items = self
            .items
            .into_iter()
            .map(|item| model::RenderItem {
                body_html: item.body_html,
                config: item.config.map(build_item_config),
            })
            .collect();

        model::RenderRequest {
            items,
            config: model::GeneralConfig {
                directory: self.config.directory,
                file_name: self.config.file_name,
                public_url_prefix: self.config.public_url_prefix,
                expiration: self.config.expiration.unwrap_or(0),
            },
        }
    }
}

fn build_item_config(config: ItemConfigRequest) -> model::ItemConfig {
    model::ItemConfig {
        orientation: config.orientation.map(|o| match o {
            Orientation::Portrait => model::Orientation::Portrait,
            Orientation::Landscape => model::Orientation::Landscape,
        }),
        display_header_footer: config.display_header_footer,
        print_background: config.print_background,
        scale: config.scale,
        size: config.size.map(PaperSize::dimensions),
        margin: config.margin.map(|m| model::PageMargin {
            top: m.top,
            bottom: m.bottom,
            left: m.left,
            right: m.right,
        }),
        page_ranges: config.page_ranges.map(|r| model::PageRange {
            start: r.start,
            end: r.end,
        }),
        header_html: config.header_html,
        footer_html: config.footer_html,
    }
}

/// Walk nested validation errors building `items[0].config.scale`-style paths.
fn flatten_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    let reason = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| default_message(&err.code));
                    out.push(format!("Field '{path}': {reason}"));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_errors(&path, nested, out),
            ValidationErrorsKind::List(list) => {
                for (index, nested) in list {
                    flatten_errors(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

fn default_message(code: &str) -> String {
    match code {
        "required" => "This field is required".to_string(),
        "length" => "Value has an invalid length".to_string(),
        "range" => "Value is out of range".to_string(),
        "http_url" => "Must be a valid http(s) URL".to_string(),
        _ => "Invalid value".to_string(),
    }
}
