/// Category assets land in the host's flat namespace, so the category is
/// folded into the remote filename with marker tokens the host never emits.
const CATEGORY_MARKER: &str = "@@CAT@@";
const DIR_MARKER: &str = "@@DIR@@";

/// Category assigned to remote files that carry no category marker.
pub const DEFAULT_CATEGORY: &str = "default";

pub fn encode_remote_name(category: &str, filename: &str) -> String {
    if category.is_empty() {
        return filename.to_string();
    }
    let encoded = category.replace(['/', '\\'], DIR_MARKER);
    format!("{encoded}{CATEGORY_MARKER}{filename}")
}

pub fn decode_remote_name(remote_name: &str) -> (String, String) {
    match remote_name.split_once(CATEGORY_MARKER) {
        Some((encoded, filename)) => {
            let category = if encoded.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                encoded.replace(DIR_MARKER, "/")
            };
            (category, filename.to_string())
        }
        None => (DEFAULT_CATEGORY.to_string(), remote_name.to_string()),
    }
}

pub fn mime_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_category_into_remote_name() {
        assert_eq!(encode_remote_name("cats", "a.png"), "cats@@CAT@@a.png");
        assert_eq!(encode_remote_name("", "a.png"), "a.png");
    }

    #[test]
    fn decode_round_trips_encoded_names() {
        let (category, filename) = decode_remote_name("cats@@CAT@@a.png");
        assert_eq!(category, "cats");
        assert_eq!(filename, "a.png");
    }

    #[test]
    fn bare_names_decode_into_default_category() {
        let (category, filename) = decode_remote_name("stray.jpg");
        assert_eq!(category, DEFAULT_CATEGORY);
        assert_eq!(filename, "stray.jpg");
    }

    #[test]
    fn nested_markers_restore_separators() {
        let (category, _) = decode_remote_name("a@@DIR@@b@@CAT@@c.png");
        assert_eq!(category, "a/b");
    }

    #[test]
    fn mime_type_defaults_to_jpeg() {
        assert_eq!(mime_type_for("a.png"), "image/png");
        assert_eq!(mime_type_for("a.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("noext"), "image/jpeg");
    }
}
