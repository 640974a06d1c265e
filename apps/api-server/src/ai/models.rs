use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use strum_macros::AsRefStr;

pub const MODEL_LIST_FILE: &str = "model_list.json";

#[derive(AsRefStr, Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum ConcreteModelType {
    BLIP,
}

/// One entry of `model_list.json`.
#[derive(Deserialize, Debug, Clone)]
pub struct CaptionModelInfo {
    /// the name clients pass as `model_name`
    pub id: String,
    /// use this to find corresponding concrete struct
    pub model_type: ConcreteModelType,
    /// use these params to instantiate the model
    pub params: Value,
}

pub fn default_model_list() -> Vec<CaptionModelInfo> {
    vec![CaptionModelInfo {
        id: "blip".to_string(),
        model_type: ConcreteModelType::BLIP,
        params: json!({
            "model_path": "blip/blip-image-captioning-large-q4k.gguf",
            "tokenizer_path": "blip/tokenizer.json",
            "model_type": "Large",
            "device": "cpu",
        }),
    }]
}

/// Read `model_list.json` from the resources dir, or the built-in list when
/// the file does not exist.
pub fn load_model_list(resources_dir: impl AsRef<Path>) -> anyhow::Result<Vec<CaptionModelInfo>> {
    let model_list_file = resources_dir.as_ref().join(MODEL_LIST_FILE);

    if !model_list_file.exists() {
        tracing::warn!(
            "{} not found, using built-in model list",
            model_list_file.display()
        );
        return Ok(default_model_list());
    }

    let model_list = std::fs::read_to_string(&model_list_file)
        .map_err(|e| anyhow::anyhow!("Failed to read model list: {}", e))?;

    let model_list: Vec<CaptionModelInfo> = serde_json::from_str(&model_list)
        .map_err(|e| anyhow::anyhow!("Invalid model list format: {}", e))?;

    let mut seen = HashSet::new();
    for model in &model_list {
        if !seen.insert(model.id.as_str()) {
            anyhow::bail!("duplicate model id in model list: {}", model.id);
        }
    }

    Ok(model_list)
}

pub(crate) fn get_str_from_params(params: &Value, name: &str) -> anyhow::Result<String> {
    match params[name].as_str() {
        Some(s) => Ok(s.into()),
        _ => anyhow::bail!("invalid {}", name),
    }
}

pub(crate) fn get_optional_str_from_params(params: &Value, name: &str) -> Option<String> {
    params[name].as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_list_falls_back_to_builtin_blip() {
        let dir = tempfile::tempdir().unwrap();
        let list = load_model_list(dir.path()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "blip");
        assert_eq!(list[0].model_type.as_ref(), "BLIP");
        assert_eq!(
            get_str_from_params(&list[0].params, "tokenizer_path").unwrap(),
            "blip/tokenizer.json"
        );
    }

    #[test]
    fn reads_list_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let entry = r#"{"id": "blip-base", "model_type": "BLIP", "params": {"model_path": "a.gguf", "tokenizer_path": "t.json", "model_type": "Base"}}"#;

        std::fs::write(dir.path().join(MODEL_LIST_FILE), format!("[{}]", entry)).unwrap();
        let list = load_model_list(dir.path()).unwrap();
        assert_eq!(list[0].id, "blip-base");
        assert_eq!(get_optional_str_from_params(&list[0].params, "device"), None);
        assert!(get_str_from_params(&list[0].params, "missing").is_err());

        std::fs::write(
            dir.path().join(MODEL_LIST_FILE),
            format!("[{}, {}]", entry, entry),
        )
        .unwrap();
        assert!(load_model_list(dir.path()).is_err());
    }

    #[test]
    fn bundled_model_list_loads() {
        let resources = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../resources");
        let list = load_model_list(resources).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "blip");
        assert_eq!(
            get_optional_str_from_params(&list[0].params, "model_type").as_deref(),
            Some("Large")
        );
    }

    #[test]
    fn unknown_model_type_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MODEL_LIST_FILE),
            r#"[{"id": "x", "model_type": "GPT", "params": {}}]"#,
        )
        .unwrap();
        assert!(load_model_list(dir.path()).is_err());
    }
}
