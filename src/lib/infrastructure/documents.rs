//! Specification documents on disk

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde_yaml::Value;

use crate::domain::specification::SchemaError;

/// Reads a YAML document into an untyped tree, ready for validation.
///
/// A leading UTF-8 byte order mark is ignored.
pub fn read_document(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    serde_yaml::from_str(text)
        .map_err(|err| SchemaError::Syntax(err.to_string()))
        .with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_read_document_ignores_byte_order_mark() -> TestResult {
        let mut file = NamedTempFile::new()?;
        file.write_all("\u{feff}sender:\n  address: news@example.com\n".as_bytes())?;

        let document = read_document(file.path())?;

        assert_eq!(
            document["sender"]["address"],
            Value::String("news@example.com".to_string())
        );

        Ok(())
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let result = read_document(Path::new("/definitely/not/here.yaml"));

        let message = format!("{:#}", result.expect_err("file does not exist"));

        assert!(message.contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn test_malformed_yaml_is_a_syntax_error() -> TestResult {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"sender: [unclosed\n")?;

        let err = read_document(file.path()).expect_err("document is malformed");

        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::Syntax(_))
        ));

        Ok(())
    }
}
