use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::prompt::Prompt;

/// Parameters used to launch a local model server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchParams {
    pub context_size: u32,
    pub ngl: u32,
    pub num_threads: u32,
    pub batch_size: u32,
    pub n_predict: i32,
    /// Multimodal projector file. Its presence marks a vision-capable model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmprojector: Option<String>,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            context_size: 512,
            ngl: 0,
            num_threads: 2,
            batch_size: 512,
            n_predict: -1,
            mmprojector: None,
        }
    }
}

impl LaunchParams {
    pub fn is_multimodal(&self) -> bool {
        self.mmprojector.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub model: String,
    pub launch: LaunchParams,
}

/// Sampling settings forwarded verbatim to the backend. Unset fields keep the backend default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
}

/// Image attached to the originating turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImagePayload {
    Url { url: String },
    Base64 { data: String, mime: String },
}

impl ImagePayload {
    /// Reference usable inside a structured prompt.
    pub fn to_url(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Base64 { data, mime } => format!("data:{mime};base64,{data}"),
        }
    }
}

/// Everything one generation run needs. Owned by that run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub prompt: Prompt,
    pub inference: InferenceConfig,
    pub sampling: SamplingConfig,
    pub clear_context: bool,
    pub parent_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl GenerationSpec {
    pub fn new(prompt: Prompt, parent_id: NodeId) -> Self {
        Self {
            prompt,
            inference: InferenceConfig::default(),
            sampling: SamplingConfig::default(),
            clear_context: false,
            parent_id,
            image: None,
            voice_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn launch_params_read_camel_case_with_defaults() {
        let params: LaunchParams =
            serde_json::from_value(json!({"contextSize": 4096, "mmprojector": "proj.gguf"})).unwrap();
        assert_eq!(params.context_size, 4096);
        assert_eq!(params.num_threads, 2);
        assert!(params.is_multimodal());
        assert!(!LaunchParams::default().is_multimodal());
    }

    #[test]
    fn sampling_omits_unset_fields() {
        let sampling = SamplingConfig {
            temperature: Some(0.7),
            n_predict: Some(128),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&sampling).unwrap(),
            json!({"temperature": 0.7f32, "n_predict": 128})
        );
    }

    #[test]
    fn base64_image_becomes_data_uri() {
        let image = ImagePayload::Base64 {
            data: "AAAA".into(),
            mime: "image/png".into(),
        };
        assert_eq!(image.to_url(), "data:image/png;base64,AAAA");
    }
}
