//! Static content-type and content-encoding lookup from a filename extension.

use std::path::Path;

/// Compressed-container extensions that map to a `Content-Encoding` value;
/// the content type is then guessed from the inner extension
/// (`primary.xml.gz` -> `gzip` + the type of `primary.xml`).
fn encoding_for(extension: &str) -> Option<&'static str> {
    match extension {
        "gz" => Some("gzip"),
        "bz2" => Some("bzip2"),
        "xz" => Some("xz"),
        "zst" => Some("zstd"),
        _ => None,
    }
}

/// Guess `(content_type, content_encoding)` for a stored object.
pub fn guess_type(path: &Path) -> (Option<String>, Option<&'static str>) {
    let encoding = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(encoding_for);

    let effective = if encoding.is_some() {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };

    let content_type = mime_guess::from_path(&effective)
        .first()
        .map(|mime| mime.essence_str().to_owned());

    (content_type, encoding)
}
