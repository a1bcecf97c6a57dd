//! Shared fixtures for integration tests.

#![allow(dead_code)]

use candle_core::DType;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tunekit_core::error::Result;
use tunekit_core::{
    AutoRegistrable, DeviceId, DeviceMap, ModuleInfo, ModuleKind, PreTrainedModel,
};

/// Something the dispatcher asked the model to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelCall {
    TieWeights,
    ToDevice(DeviceId),
    ApplyDeviceMap(DeviceMap, Option<Vec<String>>),
}

/// In-memory model that records every mutation.
#[derive(Debug, Clone)]
pub struct MockModel {
    pub quantization_method: Option<String>,
    pub loaded_in_4bit: bool,
    pub model_type: String,
    pub modules: Vec<ModuleInfo>,
    pub no_split: Option<Vec<String>>,
    pub skip_keys: Option<Vec<String>>,
    pub pretrained: bool,
    pub calls: Vec<ModelCall>,
}

impl MockModel {
    pub fn new(model_type: &str, modules: Vec<ModuleInfo>) -> Self {
        Self {
            quantization_method: None,
            loaded_in_4bit: false,
            model_type: model_type.to_string(),
            modules,
            no_split: None,
            skip_keys: None,
            pretrained: true,
            calls: Vec::new(),
        }
    }

    /// Two decoder layers, embeddings, norm and head; linear layers of `kind`.
    pub fn llama(kind: ModuleKind) -> Self {
        let linear = |name: &str| {
            let class = match kind {
                ModuleKind::Linear => "Linear",
                ModuleKind::Linear4bit => "Linear4bit",
                ModuleKind::Linear8bitLt => "Linear8bitLt",
                ModuleKind::Other => "Other",
            };
            ModuleInfo::new(name, class, kind).with_params(64)
        };
        let mut modules = vec![
            ModuleInfo::new("", "LlamaForCausalLM", ModuleKind::Other),
            ModuleInfo::new("model", "LlamaModel", ModuleKind::Other),
            ModuleInfo::new("model.embed_tokens", "Embedding", ModuleKind::Other).with_params(256),
            ModuleInfo::new("model.layers", "ModuleList", ModuleKind::Other),
        ];
        for layer in 0..2 {
            let prefix = format!("model.layers.{layer}");
            modules.push(ModuleInfo::new(&prefix, "LlamaDecoderLayer", ModuleKind::Other));
            modules.push(ModuleInfo::new(
                format!("{prefix}.self_attn"),
                "LlamaAttention",
                ModuleKind::Other,
            ));
            for proj in ["q_proj", "k_proj", "v_proj", "o_proj"] {
                modules.push(linear(&format!("{prefix}.self_attn.{proj}")));
            }
            modules.push(ModuleInfo::new(format!("{prefix}.mlp"), "LlamaMLP", ModuleKind::Other));
            for proj in ["gate_proj", "up_proj", "down_proj"] {
                modules.push(linear(&format!("{prefix}.mlp.{proj}")));
            }
        }
        modules.push(
            ModuleInfo::new("model.norm", "LlamaRMSNorm", ModuleKind::Other).with_params(16),
        );
        modules.push(linear("lm_head"));
        Self::new("llama", modules)
    }

    pub fn with_no_split(mut self, classes: &[&str]) -> Self {
        self.no_split = Some(classes.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn quantized(mut self, method: &str, in_4bit: bool) -> Self {
        self.quantization_method = Some(method.to_string());
        self.loaded_in_4bit = in_4bit;
        self
    }
}

impl AutoRegistrable for MockModel {
    fn class_name(&self) -> &str {
        "MockForCausalLM"
    }
}

impl PreTrainedModel for MockModel {
    fn quantization_method(&self) -> Option<&str> {
        self.quantization_method.as_deref()
    }

    fn is_loaded_in_4bit(&self) -> bool {
        self.loaded_in_4bit
    }

    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn dtype(&self) -> DType {
        DType::BF16
    }

    fn named_modules(&self) -> Vec<ModuleInfo> {
        self.modules.clone()
    }

    fn no_split_modules(&self) -> Option<Vec<String>> {
        self.no_split.clone()
    }

    fn skip_keys_device_placement(&self) -> Option<Vec<String>> {
        self.skip_keys.clone()
    }

    fn is_pretrained(&self) -> bool {
        self.pretrained
    }

    fn tie_weights(&mut self) {
        self.calls.push(ModelCall::TieWeights);
    }

    fn to_device(&mut self, device: DeviceId) -> Result<()> {
        self.calls.push(ModelCall::ToDevice(device));
        Ok(())
    }

    fn apply_device_map(
        &mut self,
        device_map: &DeviceMap,
        skip_keys: Option<&[String]>,
    ) -> Result<()> {
        self.calls.push(ModelCall::ApplyDeviceMap(
            device_map.clone(),
            skip_keys.map(<[String]>::to_vec),
        ));
        Ok(())
    }
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with INFO-level logs captured.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer.contents())
}
