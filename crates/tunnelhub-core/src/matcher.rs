use crate::spec::TunnelSpec;

/// Scan a line of process output against the given tunnel specs.
///
/// Returns the first spec (in registration order) whose pattern matches a
/// substring of the line, together with the matched text normalized to a
/// URL. Pure and stateless.
pub fn match_line<'a>(line: &str, specs: &'a [TunnelSpec]) -> Option<(&'a TunnelSpec, String)> {
    for spec in specs {
        if let Some(found) = spec.pattern.find(line) {
            return Some((spec, normalize_url(found.as_str().trim())));
        }
    }
    None
}

/// Prefix `http://` when the matched text does not already carry a scheme
pub fn normalize_url(text: &str) -> String {
    if text.starts_with("http") {
        text.to_string()
    } else {
        format!("http://{text}")
    }
}
