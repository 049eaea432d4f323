//! Browser configuration script
//!
//! The static front end loads `config.js` before anything else and reads
//! `window.CONFIG`.

use crate::DATA_OBJECT_KEY;

/// Render `config.js` for the given zone and optional public bucket URL
pub fn render_config_js(timezone: &str, public_url: Option<&str>) -> String {
    let mut fields = vec![format!("    TIMEZONE: '{}'", js_escape(timezone))];

    if let Some(base) = public_url
        .map(|u| u.trim().trim_end_matches('/'))
        .filter(|u| !u.is_empty())
    {
        let data_url = format!("{}/{}", base, DATA_OBJECT_KEY);
        fields.push(format!("    R2_DATA_URL: '{}'", js_escape(&data_url)));
    }

    format!("window.CONFIG = {{\n{}\n}};\n", fields.join(",\n"))
}

/// Escape a value for a single-quoted JS string literal
fn js_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3C"),
            _ => out.push(c),
        }
    }
    out
}
