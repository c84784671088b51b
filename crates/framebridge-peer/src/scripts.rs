use std::sync::{Arc, Mutex, PoisonError};

/// Collaborator that turns `<script>` snippets into live script elements.
///
/// Fire-and-forget: implementations must treat empty input as a no-op and
/// never report failures to the caller.
pub trait ScriptLoader: Send + Sync {
    fn load_scripts(&self, snippets: &[String]);
}

/// Loader that ignores every snippet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScriptLoader;

impl ScriptLoader for NoopScriptLoader {
    fn load_scripts(&self, _snippets: &[String]) {}
}

/// Loader that remembers the snippets it was handed, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingScriptLoader {
    loaded: Arc<Mutex<Vec<String>>>,
}

impl RecordingScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snippet loaded so far.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ScriptLoader for RecordingScriptLoader {
    fn load_scripts(&self, snippets: &[String]) {
        if snippets.is_empty() {
            return;
        }
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(snippets.iter().cloned());
    }
}

/// A `<script>` element read out of a snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDescriptor {
    /// Attributes in source order, names lowercased. Boolean attributes
    /// carry an empty value.
    pub attributes: Vec<(String, String)>,
    /// Inline content between the opening and closing tags.
    pub text: String,
}

impl ScriptDescriptor {
    /// Value of the named attribute, matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attribute("src")
    }
}

/// Parse the first `<script>` element in `snippet`.
///
/// Returns `None` when the snippet holds no script element or its opening
/// tag is cut off. A missing closing tag runs the text to the end of the
/// snippet.
pub fn parse_script_tag(snippet: &str) -> Option<ScriptDescriptor> {
    let lower = snippet.to_ascii_lowercase();
    let bytes = snippet.as_bytes();

    let mut pos = find_tag(&lower, "<script", 0)? + "<script".len();
    let mut attributes: Vec<(String, String)> = Vec::new();
    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }
        if *bytes.get(pos)? == b'>' {
            pos += 1;
            break;
        }

        let name_start = pos;
        while pos < bytes.len() && !ends_name(bytes[pos]) {
            pos += 1;
        }
        let name = lower[name_start..pos].to_string();

        let mut value = String::new();
        let mut peek = pos;
        while peek < bytes.len() && bytes[peek].is_ascii_whitespace() {
            peek += 1;
        }
        if bytes.get(peek) == Some(&b'=') {
            pos = peek + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let raw = match bytes.get(pos)? {
                quote @ (b'"' | b'\'') => {
                    let start = pos + 1;
                    let len = snippet[start..].find(*quote as char)?;
                    pos = start + len + 1;
                    &snippet[start..start + len]
                }
                _ => {
                    let start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'>'
                    {
                        pos += 1;
                    }
                    &snippet[start..pos]
                }
            };
            value = decode_entities(raw);
        }

        // The first occurrence of a repeated attribute wins.
        if !name.is_empty() && !attributes.iter().any(|(key, _)| *key == name) {
            attributes.push((name, value));
        }
    }

    let text_end = find_tag(&lower, "</script", pos).unwrap_or(snippet.len());
    Some(ScriptDescriptor {
        attributes,
        text: snippet[pos..text_end].to_string(),
    })
}

/// Start of the first `tag` at or after `from` that is followed by
/// whitespace, `/`, `>` or the end of input.
fn find_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(offset) = lower[search..].find(tag) {
        let start = search + offset;
        let end = start + tag.len();
        match lower.as_bytes().get(end) {
            None => return Some(start),
            Some(byte) if byte.is_ascii_whitespace() || matches!(byte, b'/' | b'>') => {
                return Some(start)
            }
            Some(_) => search = end,
        }
    }
    None
}

fn ends_name(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'=' | b'>' | b'/')
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Loader that parses each snippet into a [`ScriptDescriptor`] and keeps
/// them in load order, the way a document head collects appended scripts.
///
/// Snippets without a script element are skipped.
#[derive(Debug, Clone, Default)]
pub struct ScriptTagLoader {
    scripts: Arc<Mutex<Vec<ScriptDescriptor>>>,
}

impl ScriptTagLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every script loaded so far.
    pub fn scripts(&self) -> Vec<ScriptDescriptor> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ScriptLoader for ScriptTagLoader {
    fn load_scripts(&self, snippets: &[String]) {
        if snippets.is_empty() {
            return;
        }
        let parsed: Vec<ScriptDescriptor> = snippets
            .iter()
            .filter_map(|snippet| {
                let descriptor = parse_script_tag(snippet);
                if descriptor.is_none() {
                    tracing::debug!(snippet = %snippet, "skipping snippet without a script element");
                }
                descriptor
            })
            .collect();
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(parsed);
    }
}
