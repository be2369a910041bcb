use crate::error::ErrorKind;

/// Decoded image blob ready to hand to the server's storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A recipe image field is either a fresh data-URI upload or a reference to
/// something already stored. Anything that does not start with `data:image/`
/// passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageField {
    Blob(ImageData),
    Reference(String),
}

impl ImageField {
    pub fn parse(value: &str) -> Result<Self, crate::error::Error> {
        let Some(rest) = value.strip_prefix("data:image/") else {
            return Ok(Self::Reference(value.to_string()));
        };

        let (ext, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| ErrorKind::Validation.new("Malformed image data URI"))?;

        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ErrorKind::Validation.new("Invalid image extension"));
        }

        let bytes = base64::decode(payload).map_err(|e| {
            log::warn!("rejected image upload: {e}");
            ErrorKind::Validation.new("Invalid base64 image payload")
        })?;

        Ok(Self::Blob(ImageData {
            file_name: format!("temp.{ext}"),
            bytes,
        }))
    }

    /// The string the recipe row stores: the blob's file name, or the
    /// passed-through reference.
    pub fn stored_reference(&self) -> &str {
        match self {
            Self::Blob(data) => &data.file_name,
            Self::Reference(value) => value,
        }
    }

    pub fn into_blob(self) -> Option<ImageData> {
        match self {
            Self::Blob(data) => Some(data),
            Self::Reference(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn data_uri_decodes_to_named_blob() {
        let field = ImageField::parse("data:image/png;base64,aGVsbG8=").unwrap();
        match field {
            ImageField::Blob(data) => {
                assert_eq!(data.file_name, "temp.png");
                assert_eq!(data.bytes, b"hello");
            }
            ImageField::Reference(_) => panic!("expected a blob"),
        }
    }

    #[test]
    fn stored_reference_is_blob_file_name() {
        let field = ImageField::parse("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(field.stored_reference(), "temp.jpeg");
    }

    #[test]
    fn plain_string_passes_through() {
        let field = ImageField::parse("images/stored-42.png").unwrap();
        assert_eq!(field, ImageField::Reference("images/stored-42.png".into()));
        assert_eq!(field.stored_reference(), "images/stored-42.png");
    }

    #[test]
    fn missing_base64_marker_is_rejected() {
        let err = ImageField::parse("data:image/png,plain").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn invalid_payload_is_rejected() {
        let err = ImageField::parse("data:image/png;base64,@@@").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn empty_extension_is_rejected() {
        let err = ImageField::parse("data:image/;base64,aGVsbG8=").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
