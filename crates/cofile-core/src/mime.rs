//! MIME type detection from file name extensions

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

pub fn mime_type_for(file_name: &str) -> &'static str {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_type_for("report.PDF"), "application/pdf");
        assert_eq!(mime_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("bundle.tar.zip"), "application/zip");
        assert_eq!(mime_type_for("notes.txt"), "text/plain");
        assert_eq!(
            mime_type_for("plan.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(mime_type_for("README"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_type_for("data.unknownext"), DEFAULT_MIME_TYPE);
    }
}
