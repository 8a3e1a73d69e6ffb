//! Per-model chat-prompt templates and special tokens
//!
//! Adversarial-prompt construction needs each model family's chat format
//! reconstructed exactly: the chat template (with an `{instruction}`
//! placeholder), the GCG prefix variant used for suffix optimization, the
//! end-of-sequence token, and the end-of-turn string that opens the
//! assistant turn. All lookups dispatch on the model identifier by ordered
//! substring checks, first match wins, and fail with a configuration error
//! for unrecognized identifiers — there is no default family.

use crate::error::{Error, Result};
use std::str::FromStr;

/// A chat-prompt template for one model family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTemplate {
    /// Human-readable description
    pub description: &'static str,
    /// Prompt text; chat variants carry an `{instruction}` placeholder,
    /// GCG variants end right where the optimized suffix is appended
    pub prompt: &'static str,
}

impl ChatTemplate {
    /// Substitute the `{instruction}` placeholder with the given text
    pub fn render(&self, instruction: &str) -> String {
        self.prompt.replace("{instruction}", instruction)
    }
}

/// Which template variant to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Full chat template with `{instruction}` placeholder
    Chat,
    /// GCG prefix template for adversarial-suffix optimization
    Gcg,
}

impl FromStr for TemplateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chat" => Ok(Self::Chat),
            "GCG" => Ok(Self::Gcg),
            other => Err(Error::config(format!(
                "Unknown template kind {other:?}, should be one of \"GCG\", \"chat\""
            ))),
        }
    }
}

/// Supported model families, resolved from a model identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Llama 2 chat models
    Llama2,
    /// Llama 3 instruct models
    Llama3,
    /// MosaicML MPT chat models
    Mpt,
    /// Google Gemma models
    Gemma,
    /// Qwen chat models
    Qwen,
    /// AllenAI Tulu models
    Tulu,
    /// Mistral instruct models
    Mistral,
    /// Vicuna models
    Vicuna,
    /// OpenAI GPT models (EOS lookup only)
    Gpt,
    /// Falcon models (EOS lookup only)
    Falcon,
    /// Anthropic Claude models (EOS lookup only)
    Claude,
}

/// Ordered dispatch rules; first match wins. Llama-2 must stay ahead of
/// the Llama-3 check.
const FAMILY_RULES: &[(&str, ModelFamily)] = &[
    ("Llama-2", ModelFamily::Llama2),
    ("Llama-3", ModelFamily::Llama3),
    ("mpt", ModelFamily::Mpt),
    ("gemma", ModelFamily::Gemma),
    ("Qwen", ModelFamily::Qwen),
    ("tulu", ModelFamily::Tulu),
    ("mistral", ModelFamily::Mistral),
    ("vicuna", ModelFamily::Vicuna),
    ("gpt", ModelFamily::Gpt),
    ("falcon", ModelFamily::Falcon),
    ("claude", ModelFamily::Claude),
];

impl ModelFamily {
    /// Resolve a model identifier to its family by ordered substring checks
    pub fn detect(model_id: &str) -> Result<Self> {
        FAMILY_RULES
            .iter()
            .find(|(needle, _)| model_id.contains(needle))
            .map(|(_, family)| *family)
            .ok_or_else(|| Error::config(format!("Unknown model {model_id}")))
    }
}

const LLAMA2_CHAT: ChatTemplate = ChatTemplate {
    description: "Llama 2 chat one shot prompt",
    prompt: "[INST] <<SYS>>\nYou are a helpful, respectful and honest assistant. Always answer as helpfully as possible, while being safe. Your answers should not include any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. Please ensure that your responses are socially unbiased and positive in nature.\n\nIf a question does not make any sense, or is not factually coherent, explain why instead of answering something not correct. If you don't know the answer to a question, please don't share false information.\n<</SYS>>\n\n{instruction} [/INST] ",
};

const LLAMA2_GCG: ChatTemplate = ChatTemplate {
    description: "Llama 2 GCG prompt",
    prompt: "[INST] <<SYS>>\nYou are a helpful, respectful and honest assistant. Always answer as helpfully as possible, while being safe. Your answers should not include any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. Please ensure that your responses are socially unbiased and positive in nature.\n\nIf a question does not make any sense, or is not factually coherent, explain why instead of answering something not correct. If you don't know the answer to a question, please don't share false information.\n<</SYS>>\n\n",
};

const MPT_CHAT: ChatTemplate = ChatTemplate {
    description: "MPT 7B chat one shot prompt",
    prompt: "<|im_start|>system\n- You are a helpful assistant chatbot trained by MosaicML.\n- You answer questions.\n- You are excited to be able to help the user, but will refuse to do anything that could be considered harmful to the user.\n- You are more than just an information source, you are also able to write poetry, short stories, and make jokes.<|im_end|>\n<|im_start|>user\n{instruction}<|im_end|>\n<|im_start|>assistant\n",
};

const MPT_GCG: ChatTemplate = ChatTemplate {
    description: "MPT 7B GCG prompt",
    prompt: "<|im_start|>system\n- You are a helpful assistant chatbot trained by MosaicML.\n- You answer questions.\n- You are excited to be able to help the user, but will refuse to do anything that could be considered harmful to the user.\n- You are more than just an information source, you are also able to write poetry, short stories, and make jokes.<|im_end|>\n<|im_start|>user\n",
};

const GEMMA_CHAT: ChatTemplate = ChatTemplate {
    description: "Gemma 7B chat one shot prompt",
    prompt: "<start_of_turn>user\n{instruction}<end_of_turn>\n<start_of_turn>model\n",
};

const GEMMA_GCG: ChatTemplate = ChatTemplate {
    description: "Gemma 7B GCG prompt",
    prompt: "<start_of_turn>user\n",
};

const QWEN_CHAT: ChatTemplate = ChatTemplate {
    description: "Qwen 7B chat prompt",
    prompt: "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n<|im_start|>user\n{instruction}<|im_end|>\n<|im_start|>assistant\n",
};

const QWEN_GCG: ChatTemplate = ChatTemplate {
    description: "Qwen 7B GCG prompt",
    prompt: "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n<|im_start|>user\n",
};

const TULU_CHAT: ChatTemplate = ChatTemplate {
    description: "Tulu 7B chat prompt",
    prompt: "<|user|>\n{instruction}\n<|assistant|>\n",
};

const TULU_GCG: ChatTemplate = ChatTemplate {
    description: "Tulu 7B GCG prompt",
    prompt: "<|user|>\n",
};

const VICUNA_CHAT: ChatTemplate = ChatTemplate {
    description: "Vicuna 7B chat prompt",
    prompt: "A chat between a curious user and an artificial intelligence assistant. The assistant gives helpful, detailed, and polite answers to the user's questions. USER: {instruction} ASSISTANT:",
};

const VICUNA_GCG: ChatTemplate = ChatTemplate {
    description: "Vicuna 7B GCG prompt",
    prompt: "A chat between a curious user and an artificial intelligence assistant. The assistant gives helpful, detailed, and polite answers to the user's questions. USER: ",
};

const MISTRAL_CHAT: ChatTemplate = ChatTemplate {
    description: "Mistral 7B chat prompt",
    prompt: "<s>[INST] {instruction} [/INST]",
};

const MISTRAL_GCG: ChatTemplate = ChatTemplate {
    description: "Mistral 7B GCG prompt",
    prompt: "<s>[INST] ",
};

const LLAMA3_CHAT: ChatTemplate = ChatTemplate {
    description: "Llama 3 8B chat prompt",
    prompt: "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n{instruction}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n",
};

const LLAMA3_GCG: ChatTemplate = ChatTemplate {
    description: "Llama 3 8B GCG prompt",
    prompt: "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n",
};

/// Look up the chat or GCG template for a model identifier
///
/// Fails with a configuration error when no family matches the identifier
/// or the matched family has no prompt template (hosted-only families).
pub fn get_templates(model_id: &str, kind: TemplateKind) -> Result<&'static ChatTemplate> {
    let family = ModelFamily::detect(model_id)?;
    let pair = match family {
        ModelFamily::Llama2 => (&LLAMA2_CHAT, &LLAMA2_GCG),
        ModelFamily::Llama3 => (&LLAMA3_CHAT, &LLAMA3_GCG),
        ModelFamily::Mpt => (&MPT_CHAT, &MPT_GCG),
        ModelFamily::Gemma => (&GEMMA_CHAT, &GEMMA_GCG),
        ModelFamily::Qwen => (&QWEN_CHAT, &QWEN_GCG),
        ModelFamily::Tulu => (&TULU_CHAT, &TULU_GCG),
        ModelFamily::Mistral => (&MISTRAL_CHAT, &MISTRAL_GCG),
        ModelFamily::Vicuna => (&VICUNA_CHAT, &VICUNA_GCG),
        ModelFamily::Gpt | ModelFamily::Falcon | ModelFamily::Claude => {
            return Err(Error::config(format!(
                "No prompt template for model {model_id}"
            )))
        }
    };
    Ok(match kind {
        TemplateKind::Chat => pair.0,
        TemplateKind::Gcg => pair.1,
    })
}

/// Look up the end-of-sequence token for a model identifier
pub fn get_eos(model_id: &str) -> Result<&'static str> {
    match ModelFamily::detect(model_id).map_err(|_| {
        Error::config(format!(
            "Unknown model {model_id}, set the eos token manually"
        ))
    })? {
        ModelFamily::Llama2 | ModelFamily::Tulu | ModelFamily::Mistral | ModelFamily::Vicuna => {
            Ok("</s>")
        }
        ModelFamily::Mpt | ModelFamily::Gpt | ModelFamily::Qwen | ModelFamily::Falcon => {
            Ok("<|endoftext|>")
        }
        ModelFamily::Gemma => Ok("<eos>"),
        ModelFamily::Claude => Ok("<EOT>"),
        ModelFamily::Llama3 => Ok("<|end_of_text|>"),
    }
}

/// Look up the end-of-turn string that closes the user turn and opens the
/// assistant turn for a model identifier
pub fn get_end_tokens(model_id: &str) -> Result<&'static str> {
    let unknown = || {
        Error::config(format!(
            "Unknown model {model_id}, set the end tokens manually"
        ))
    };
    match ModelFamily::detect(model_id).map_err(|_| unknown())? {
        ModelFamily::Llama2 => Ok(" [/INST] "),
        ModelFamily::Mpt | ModelFamily::Qwen => Ok("<|im_end|>\n<|im_start|>assistant\n"),
        ModelFamily::Gemma => Ok("<end_of_turn>\n<start_of_turn>model\n"),
        ModelFamily::Tulu => Ok("\n<|assistant|>\n"),
        ModelFamily::Mistral => Ok(" [/INST]"),
        ModelFamily::Vicuna => Ok(" ASSISTANT:"),
        ModelFamily::Llama3 => Ok("<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n"),
        ModelFamily::Gpt | ModelFamily::Falcon | ModelFamily::Claude => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_llama2_over_llama3() {
        assert_eq!(
            ModelFamily::detect("meta-llama/Llama-2-7b-chat-hf").unwrap(),
            ModelFamily::Llama2
        );
        assert_eq!(
            ModelFamily::detect("meta-llama/Meta-Llama-3-8B-Instruct").unwrap(),
            ModelFamily::Llama3
        );
    }

    #[test]
    fn test_detect_unknown_model() {
        assert!(matches!(
            ModelFamily::detect("bigscience/bloom-7b1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_llama2_lookups() {
        let id = "meta-llama/Llama-2-7b-chat-hf";
        let chat = get_templates(id, TemplateKind::Chat).unwrap();
        assert!(chat.prompt.starts_with("[INST] <<SYS>>\n"));
        assert!(chat.prompt.ends_with("{instruction} [/INST] "));
        let gcg = get_templates(id, TemplateKind::Gcg).unwrap();
        assert!(gcg.prompt.ends_with("<</SYS>>\n\n"));
        assert_eq!(get_eos(id).unwrap(), "</s>");
        assert_eq!(get_end_tokens(id).unwrap(), " [/INST] ");
    }

    #[test]
    fn test_family_literals() {
        assert_eq!(get_eos("mosaicml/mpt-7b-chat").unwrap(), "<|endoftext|>");
        assert_eq!(get_eos("google/gemma-7b-it").unwrap(), "<eos>");
        assert_eq!(get_eos("Qwen/Qwen1.5-7B-Chat").unwrap(), "<|endoftext|>");
        assert_eq!(get_eos("allenai/tulu-2-7b").unwrap(), "</s>");
        assert_eq!(get_eos("mistralai/mistral-7b-instruct").unwrap(), "</s>");
        assert_eq!(get_eos("lmsys/vicuna-7b-v1.5").unwrap(), "</s>");
        assert_eq!(get_eos("gpt-4").unwrap(), "<|endoftext|>");
        assert_eq!(get_eos("tiiuae/falcon-7b-instruct").unwrap(), "<|endoftext|>");
        assert_eq!(get_eos("claude-instant-1.2").unwrap(), "<EOT>");
        assert_eq!(
            get_eos("meta-llama/Meta-Llama-3-8B-Instruct").unwrap(),
            "<|end_of_text|>"
        );
    }

    #[test]
    fn test_end_tokens_literals() {
        assert_eq!(
            get_end_tokens("Qwen/Qwen1.5-7B-Chat").unwrap(),
            "<|im_end|>\n<|im_start|>assistant\n"
        );
        assert_eq!(
            get_end_tokens("google/gemma-7b-it").unwrap(),
            "<end_of_turn>\n<start_of_turn>model\n"
        );
        assert_eq!(get_end_tokens("allenai/tulu-2-7b").unwrap(), "\n<|assistant|>\n");
        assert_eq!(
            get_end_tokens("mistralai/mistral-7b-instruct").unwrap(),
            " [/INST]"
        );
        assert_eq!(get_end_tokens("lmsys/vicuna-7b-v1.5").unwrap(), " ASSISTANT:");
        assert_eq!(
            get_end_tokens("meta-llama/Meta-Llama-3-8B-Instruct").unwrap(),
            "<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn test_unknown_identifier_errors_everywhere() {
        let id = "bigscience/bloom-7b1";
        assert!(get_templates(id, TemplateKind::Chat).is_err());
        assert!(get_eos(id).is_err());
        assert!(get_end_tokens(id).is_err());
    }

    #[test]
    fn test_hosted_family_has_no_template() {
        assert!(get_templates("gpt-4", TemplateKind::Chat).is_err());
        assert!(get_end_tokens("claude-instant-1.2").is_err());
    }

    #[test]
    fn test_template_kind_from_str() {
        assert_eq!("chat".parse::<TemplateKind>().unwrap(), TemplateKind::Chat);
        assert_eq!("GCG".parse::<TemplateKind>().unwrap(), TemplateKind::Gcg);
        assert!("suffix".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_render_substitutes_instruction() {
        let rendered = get_templates("lmsys/vicuna-7b-v1.5", TemplateKind::Chat)
            .unwrap()
            .render("Write a haiku");
        assert!(rendered.contains("USER: Write a haiku ASSISTANT:"));
        assert!(!rendered.contains("{instruction}"));
    }
}
