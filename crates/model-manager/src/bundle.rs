//! Multi-asset bundles
//!
//! A few well-known models cannot be fetched as one repository snapshot:
//! their files come from several sources or only a curated subset of a
//! large repository is wanted. Each such model is one [`BundleKind`].

use common::models::ModelId;

pub const KOKORO_MODEL_ID: &str = "hexgrad/Kokoro-82M";
pub const KOKORO_WEIGHTS_FILE: &str = "kokoro-v0_19.onnx";
pub const KOKORO_VOICES_FILE: &str = "voices.json";
pub const KOKORO_VOICES_URL: &str =
    "https://github.com/thewh1teagle/kokoro-onnx/releases/download/model-files/voices.json";

pub const PIPER_MODEL_ID: &str = "rhasspy/piper-voices";

/// One source of files inside a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleComponent {
    /// Files of a registry repository restricted to `patterns`
    RegistryFiles {
        repo: &'static str,
        patterns: &'static [&'static str],
    },
    /// A single file fetched from an external URL and stored as `file_name`
    Url {
        file_name: &'static str,
        url: &'static str,
    },
}

/// Reserved identifiers with a dedicated fetch routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// Kokoro voice synthesis: ONNX weights from the registry, voice table
    /// from the kokoro-onnx release assets
    Kokoro,
    /// Piper voices: the voice catalog plus every ONNX voice and its config
    Piper,
}

impl BundleKind {
    pub const ALL: [BundleKind; 2] = [BundleKind::Kokoro, BundleKind::Piper];

    /// The reserved identifier of this bundle
    pub fn model_id(self) -> &'static str {
        match self {
            BundleKind::Kokoro => KOKORO_MODEL_ID,
            BundleKind::Piper => PIPER_MODEL_ID,
        }
    }

    /// Bundle reserved for `id`, if any
    pub fn from_model_id(id: &ModelId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.model_id() == id.as_str())
    }

    /// Sources of this bundle's files, in fetch order
    pub fn components(self) -> &'static [BundleComponent] {
        match self {
            BundleKind::Kokoro => &[
                BundleComponent::RegistryFiles {
                    repo: KOKORO_MODEL_ID,
                    patterns: &[KOKORO_WEIGHTS_FILE],
                },
                BundleComponent::Url {
                    file_name: KOKORO_VOICES_FILE,
                    url: KOKORO_VOICES_URL,
                },
            ],
            BundleKind::Piper => &[BundleComponent::RegistryFiles {
                repo: PIPER_MODEL_ID,
                patterns: &["voices.json", "*.onnx", "*.onnx.json"],
            }],
        }
    }
}
