//! Helpers shared by the page handlers
//!
//! - query parameter parsing (`page`, `q`/`query`, ids in paths)
//! - the site-wide template context every page receives
//! - rendering with flash-cookie cleanup
//! - multipart form reading for the upload forms

use axum::{
    body::Bytes,
    extract::Multipart,
    http::header,
    response::{Html, IntoResponse, Response},
};

use serde::Deserialize;
use tera::Context as TeraContext;

use super::middleware::{clear_flash_cookie, AppState, Page, WebError};
use crate::models::PageRequest;

/// `?page=` as sent by pagination links
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn request(&self, per_page: i64) -> PageRequest {
        PageRequest::new(parse_page(self.page.as_deref()), per_page)
    }
}

/// Missing or non-numeric page numbers read as the first page.
///
/// Out-of-range numbers are left for `PageRequest::resolve` to clamp.
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(1)
}

/// The search text from `query` or `q`, `query` winning when both are set
pub fn search_text(query: Option<&str>, q: Option<&str>) -> String {
    query
        .filter(|value| !value.trim().is_empty())
        .or(q)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Query-string prefix that pagination links append `page=N` to.
///
/// Empty values are left out: `[("q", "rust"), ("sort", "")]` gives `q=rust&`.
pub fn page_query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}&", key, urlencoding::encode(value)))
        .collect()
}

/// Numeric path segment; anything else is a 404
pub fn parse_id(raw: &str) -> Result<i64, WebError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(WebError::NotFound)
}

/// Context every page starts from
pub async fn site_context(state: &AppState, page: &Page) -> Result<TeraContext, WebError> {
    let categories = state.category_service.list().await?;
    let top_categories = state.category_service.top_categories().await?;

    let mut ctx = TeraContext::new();
    ctx.insert("categories", &categories);
    ctx.insert("top_categories", &top_categories);
    ctx.insert("viewer", &page.user());
    ctx.insert("is_admin", &page.viewer.is_admin());
    ctx.insert("flash", &page.flash);
    ctx.insert("request_path", &page.path);
    Ok(ctx)
}

/// Render a template; a shown flash message is cleared on the way out
pub fn render(
    state: &AppState,
    page: &Page,
    template: &str,
    ctx: &TeraContext,
) -> Result<Response, WebError> {
    let html = state.theme.render(template, ctx)?;
    let mut response = Html(html).into_response();
    if page.flash.is_some() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, clear_flash_cookie());
    }
    Ok(response)
}

/// `site_context` plus the page's own values, rendered
pub async fn render_page(
    state: &AppState,
    page: &Page,
    template: &str,
    extra: TeraContext,
) -> Result<Response, WebError> {
    let mut ctx = site_context(state, page).await?;
    ctx.extend(extra);
    render(state, page, template, &ctx)
}

// ============================================================================
// Multipart forms
// ============================================================================

/// An uploaded file part
#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: String,
    pub data: Bytes,
}

/// Text fields and file parts of a multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, Upload)>,
}

impl MultipartForm {
    /// Read every part. File inputs left empty by the browser are skipped.
    pub async fn read(mut multipart: Multipart) -> Result<Self, WebError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| WebError::BadRequest(format!("Failed to read form: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| WebError::BadRequest(format!("Failed to read upload: {}", e)))?;
                if !data.is_empty() {
                    form.files.push((name, Upload { content_type, data }));
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| WebError::BadRequest(format!("Failed to read form: {}", e)))?;
                form.fields.push((name, value));
            }
        }
        Ok(form)
    }

    /// First value of a text field, empty when absent
    pub fn text(&self, name: &str) -> String {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(key, _)| key == name)
    }

    /// Every value of a repeated field parsed as ids; unparsable values are dropped
    pub fn ids(&self, name: &str) -> Vec<i64> {
        self.fields
            .iter()
            .filter(|(key, _)| key == name)
            .filter_map(|(_, value)| value.trim().parse().ok())
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, upload)| upload)
    }
}
