//! Opening and closing text written around the concatenated body.

use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::file_handler::open_at;
use super::CoreError;
use crate::config::{ModuleConfig, ModuleType};

/// Writes the module shell selected by a [`ModuleConfig`].
///
/// Both ends only ever touch `[offset, offset + len)` of the output file.
#[derive(Debug, Clone)]
pub struct ModuleWrapper {
    module_type: ModuleType,
    module_name: String,
}

impl ModuleWrapper {
    pub fn new(config: &ModuleConfig) -> Self {
        Self {
            module_type: config.module_type,
            module_name: config.module_name.clone(),
        }
    }

    pub fn prefix(&self) -> String {
        let name = &self.module_name;
        match self.module_type {
            ModuleType::None | ModuleType::CommonJs => String::new(),
            ModuleType::Web => format!("var {} = (function () {{\n", name),
            ModuleType::Amd => {
                format!("define(\"{}\", function (require, exports, module) {{\n", name)
            }
            ModuleType::Umd => format!(
                concat!(
                    "(function (root, factory) {{\n",
                    "    if (typeof define === \"function\" && define.amd) {{\n",
                    "        define(\"{name}\", [], factory);\n",
                    "    }} else if (typeof module === \"object\" && module.exports) {{\n",
                    "        module.exports = factory();\n",
                    "    }} else {{\n",
                    "        root.{name} = factory();\n",
                    "    }}\n",
                    "}}(typeof self !== \"undefined\" ? self : this, function () {{\n",
                ),
                name = name
            ),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self.module_type {
            ModuleType::None | ModuleType::CommonJs => "",
            ModuleType::Web => "})();\n",
            ModuleType::Amd => "});\n",
            ModuleType::Umd => "}));\n",
        }
    }

    /// Writes the opening wrapper at `offset`, returning the advanced cursor.
    pub async fn open_module(&self, output: &Path, offset: u64) -> Result<u64, CoreError> {
        write_wrapper(output, offset, self.prefix().as_bytes()).await
    }

    /// Writes the closing wrapper at `offset`, returning the advanced cursor.
    pub async fn close_module(&self, output: &Path, offset: u64) -> Result<u64, CoreError> {
        write_wrapper(output, offset, self.suffix().as_bytes()).await
    }
}

async fn write_wrapper(output: &Path, offset: u64, bytes: &[u8]) -> Result<u64, CoreError> {
    if bytes.is_empty() {
        return Ok(offset);
    }

    let mut file = open_at(output, offset).await?;
    file.write_all(bytes)
        .await
        .map_err(|e| CoreError::io(e, output))?;
    file.flush().await.map_err(|e| CoreError::io(e, output))?;

    Ok(offset + bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn wrapper(module_type: ModuleType) -> ModuleWrapper {
        ModuleWrapper::new(&ModuleConfig {
            module_name: "lib".into(),
            module_type,
        })
    }

    #[tokio::test]
    async fn test_none_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.js");
        fs::write(&out, "body").unwrap();

        let w = wrapper(ModuleType::None);
        assert_eq!(w.open_module(&out, 0).await.unwrap(), 0);
        assert_eq!(w.close_module(&out, 4).await.unwrap(), 4);
        assert_eq!(fs::read_to_string(&out).unwrap(), "body");
    }

    #[tokio::test]
    async fn test_web_wraps_in_iife() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.js");
        fs::write(&out, "").unwrap();

        let w = wrapper(ModuleType::Web);
        let cursor = w.open_module(&out, 0).await.unwrap();
        assert_eq!(cursor, w.prefix().len() as u64);

        let mut body = fs::read(&out).unwrap();
        body.extend_from_slice(b"return 1;\n");
        fs::write(&out, &body).unwrap();

        let end = w.close_module(&out, body.len() as u64).await.unwrap();
        let content = fs::read_to_string(&out).unwrap();

        assert_eq!(content, "var lib = (function () {\nreturn 1;\n})();\n");
        assert_eq!(end, content.len() as u64);
    }

    #[tokio::test]
    async fn test_close_never_touches_earlier_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.js");
        fs::write(&out, "0123456789").unwrap();

        wrapper(ModuleType::Amd).close_module(&out, 4).await.unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "0123});\n89");
    }

    #[test]
    fn test_umd_prefix_names_module() {
        let prefix = wrapper(ModuleType::Umd).prefix();
        assert!(prefix.contains("define(\"lib\", [], factory);"));
        assert!(prefix.contains("root.lib = factory();"));
        assert!(prefix.ends_with("function () {\n"));
    }
}
