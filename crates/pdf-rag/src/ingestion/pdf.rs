//! Page-by-page PDF text extraction

use lopdf::Document;
use regex::Regex;
use std::sync::{mpsc, OnceLock};
use std::thread;
use std::time::Duration;

/// Extract the text of every page, in page order.
///
/// Returns one entry per page (possibly empty for image-only pages). The error
/// string describes why the whole file is unusable.
pub fn extract_pages(data: &[u8], timeout: Duration) -> std::result::Result<Vec<String>, String> {
    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    // Some fonts send the extractors into very long loops; run in a separate
    // thread so one bad file cannot stall the whole build.
    let handle = thread::spawn(move || {
        let _ = tx.send(extract_pages_blocking(&data_vec));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            let _ = handle.join();
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::error!("PDF extraction timeout after {:?}", timeout);
            Err(format!("text extraction timed out after {}s", timeout.as_secs()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            tracing::error!("PDF extraction thread crashed");
            Err("text extraction crashed".to_string())
        }
    }
}

fn extract_pages_blocking(data: &[u8]) -> std::result::Result<Vec<String>, String> {
    let doc = Document::load_mem(data).map_err(|e| format!("Failed to load PDF: {}", e))?;

    if doc.is_encrypted() {
        return Err("PDF is encrypted".to_string());
    }

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err("PDF has no pages".to_string());
    }

    let mut texts = Vec::with_capacity(pages.len());
    for (page_num, page_id) in &pages {
        let raw = match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("lopdf could not extract page {}: {}, scanning content stream", page_num, e);
                doc.get_page_content(*page_id)
                    .map(|content| extract_text_from_content(&content))
                    .unwrap_or_default()
            }
        };
        texts.push(cleanup_pdf_text(&raw));
    }

    if texts.iter().all(|t| t.trim().is_empty()) {
        tracing::warn!("Per-page extraction produced no text, trying pdf-extract");
        if let Ok(full) = pdf_extract::extract_text_from_mem(data) {
            return Ok(redistribute(&full, texts.len()));
        }
    }

    Ok(texts)
}

/// Spread whole-document text over `page_count` pages. pdf-extract separates
/// pages with form feeds; if the counts disagree everything lands on page 0.
fn redistribute(full: &str, page_count: usize) -> Vec<String> {
    let split: Vec<String> = full.split('\u{000C}').map(cleanup_pdf_text).collect();
    if split.len() == page_count {
        return split;
    }

    let mut pages = vec![String::new(); page_count];
    if let Some(first) = pages.first_mut() {
        *first = cleanup_pdf_text(full);
    }
    pages
}

/// Extract text from PDF content stream bytes (BT ... Tj/TJ ... ET blocks)
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let line = line.trim();

        if line == "BT" {
            in_text_block = true;
            continue;
        }

        if line == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push('\n');
                current_text.clear();
            }
            continue;
        }

        if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) {
            if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                if start < end {
                    let decoded = line[start + 1..end]
                        .replace("\\n", "\n")
                        .replace("\\r", "\r")
                        .replace("\\t", "\t")
                        .replace("\\(", "(")
                        .replace("\\)", ")")
                        .replace("\\\\", "\\");
                    current_text.push_str(&decoded);
                }
            }
        }
    }

    text
}

fn glyph_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[(<]?uni([0-9A-Fa-f]{4})[)>]?").expect("static regex"))
}

/// Normalise extracted PDF text: resolve `uniXXXX` glyph names, fold
/// typographic punctuation and ligatures to ASCII, drop NULs and blank lines.
pub fn cleanup_pdf_text(text: &str) -> String {
    let resolved = glyph_name_regex().replace_all(text, |caps: &regex::Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    let folded = resolved
        .replace(['\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2212}'], "-")
        .replace('\u{2014}', "--")
        .replace(['\u{2018}', '\u{2019}', '\u{201A}'], "'")
        .replace(['\u{201C}', '\u{201D}', '\u{201E}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace(['\u{00A0}', '\u{2002}', '\u{2003}', '\u{2009}'], " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\0', "");

    folded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
