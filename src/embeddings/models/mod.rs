// Known embedding models and their vector widths


use super::EmbedderProvider;

/// An embedding model with a known output width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    pub id: &'static str,
    pub dimension: usize,
}

const OPENAI_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "text-embedding-3-small",
        dimension: 1536,
    },
    ModelProfile {
        id: "text-embedding-3-large",
        dimension: 3072,
    },
    ModelProfile {
        id: "text-embedding-ada-002",
        dimension: 1536,
    },
];

const OLLAMA_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "nomic-embed-text",
        dimension: 768,
    },
    ModelProfile {
        id: "nomic-embed-code",
        dimension: 3584,
    },
    ModelProfile {
        id: "mxbai-embed-large",
        dimension: 1024,
    },
    ModelProfile {
        id: "all-minilm",
        dimension: 384,
    },
];

const OPENAI_COMPATIBLE_EXTRA_MODELS: &[ModelProfile] = &[ModelProfile {
    id: "nomic-embed-code",
    dimension: 3584,
}];

const GEMINI_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "text-embedding-004",
        dimension: 768,
    },
    ModelProfile {
        id: "gemini-embedding-001",
        dimension: 3072,
    },
];

const MISTRAL_MODELS: &[ModelProfile] = &[ModelProfile {
    id: "codestral-embed-2505",
    dimension: 1536,
}];

/// Model used when the configuration names none
#[inline]
pub fn default_model_id(provider: EmbedderProvider) -> &'static str {
    match provider {
        EmbedderProvider::OpenAi | EmbedderProvider::OpenAiCompatible => "text-embedding-3-small",
        EmbedderProvider::Ollama => "nomic-embed-text",
        EmbedderProvider::Gemini => "gemini-embedding-001",
        EmbedderProvider::Mistral => "codestral-embed-2505",
    }
}

/// Profiles known for a provider
#[inline]
pub fn profiles(provider: EmbedderProvider) -> impl Iterator<Item = &'static ModelProfile> {
    let (primary, extra): (&[ModelProfile], &[ModelProfile]) = match provider {
        EmbedderProvider::OpenAi => (OPENAI_MODELS, &[]),
        EmbedderProvider::OpenAiCompatible => (OPENAI_MODELS, OPENAI_COMPATIBLE_EXTRA_MODELS),
        EmbedderProvider::Ollama => (OLLAMA_MODELS, &[]),
        EmbedderProvider::Gemini => (GEMINI_MODELS, &[]),
        EmbedderProvider::Mistral => (MISTRAL_MODELS, &[]),
    };
    primary.iter().chain(extra)
}

/// Vector width of `model_id` for `provider`, if the model is known
///
/// Ollama tags such as `:latest` are ignored.
#[inline]
pub fn get_model_dimension(provider: EmbedderProvider, model_id: &str) -> Option<usize> {
    let model_id = match provider {
        EmbedderProvider::Ollama => model_id
            .split_once(':')
            .map_or(model_id, |(name, _tag)| name),
        _ => model_id,
    };

    profiles(provider)
        .find(|profile| profile.id == model_id)
        .map(|profile| profile.dimension)
}
