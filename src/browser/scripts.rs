//! JavaScript snippets evaluated inside pages.

/// Quote `text` as a JS string literal.
pub fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Boolean expression: an element matching `selector` exists (and is visible).
pub fn selector_present(selector: &str, visible: bool) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  if (!{visible}) return true;
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  return style.visibility !== 'hidden' && style.display !== 'none' && rect.width > 0 && rect.height > 0;
}})()"#,
        sel = js_string(selector),
        visible = visible
    )
}

/// Expression clicking the first match of `selector`; yields whether it existed.
pub fn click(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.click();
  return true;
}})()"#,
        sel = js_string(selector)
    )
}

/// Boolean expression: some text container holds a `DD/MM/YYYY HH:MM:SS`
/// or `DD.MM.YYYY HH:MM:SS` stamp.
pub const DATE_STAMP_PRESENT: &str = r#"(() => {
  const pattern = /\d{2}([\/.])\d{2}\1\d{4}\s+\d{2}:\d{2}:\d{2}/;
  const elements = document.querySelectorAll('div, span, td');
  for (let i = 0; i < elements.length; i++) {
    const text = elements[i].textContent && elements[i].textContent.trim();
    if (text && pattern.test(text)) return true;
  }
  return false;
})()"#;

/// Boolean expression: `selector` exists inside the document of iframe `frame`.
pub fn frame_selector_present(frame: &str, selector: &str) -> String {
    format!(
        r#"(() => {{
  const frame = document.querySelector({frame});
  if (!frame || !frame.contentDocument) return false;
  return frame.contentDocument.querySelector({sel}) !== null;
}})()"#,
        frame = js_string(frame),
        sel = js_string(selector)
    )
}

/// Boolean expression: `selector` inside iframe `frame` has non-blank text.
pub fn frame_text_populated(frame: &str, selector: &str) -> String {
    format!(
        r#"(() => {{
  const frame = document.querySelector({frame});
  if (!frame || !frame.contentDocument) return false;
  const el = frame.contentDocument.querySelector({sel});
  return !!(el && el.textContent && el.textContent.trim() !== '');
}})()"#,
        frame = js_string(frame),
        sel = js_string(selector)
    )
}

/// Array of trimmed texts of every `selector` match inside iframe `frame`.
pub fn frame_texts(frame: &str, selector: &str) -> String {
    format!(
        r#"(() => {{
  const frame = document.querySelector({frame});
  if (!frame || !frame.contentDocument) return [];
  return Array.from(frame.contentDocument.querySelectorAll({sel}))
    .map((el) => (el.textContent || '').trim());
}})()"#,
        frame = js_string(frame),
        sel = js_string(selector)
    )
}

/// Object mapping each key to the trimmed text of its selector inside iframe `frame`.
pub fn frame_field_texts(frame: &str, fields: &[(String, String)]) -> String {
    let entries = fields
        .iter()
        .map(|(key, selector)| format!("{}: read({})", js_string(key), js_string(selector)))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        r#"(() => {{
  const frame = document.querySelector({frame});
  if (!frame || !frame.contentDocument) return {{}};
  const doc = frame.contentDocument;
  const read = (sel) => {{
    const el = doc.querySelector(sel);
    return ((el && el.textContent) || '').trim();
  }};
  return {{
    {entries}
  }};
}})()"#,
        frame = js_string(frame),
        entries = entries
    )
}
