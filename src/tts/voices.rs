//! Selectable synthesis voices

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub id: &'static str,
    pub name: &'static str,
}

pub const DEFAULT_VOICE: &str = "ru-RU-DmitryNeural";

pub const VOICES: &[Voice] = &[
    // Native Russian
    Voice { id: "ru-RU-DmitryNeural", name: "🇷🇺 Dmitry (Native Male)" },
    Voice { id: "ru-RU-SvetlanaNeural", name: "🇷🇺 Svetlana (Native Female)" },
    Voice { id: "ru-RU-DariyaNeural", name: "🇷🇺 Dariya (Native Female)" },
    // Multilingual male
    Voice { id: "en-US-AndrewMultilingualNeural", name: "🇺🇸 Andrew (Multilingual Male)" },
    Voice { id: "en-US-BrianMultilingualNeural", name: "🇺🇸 Brian (Multilingual Male)" },
    Voice { id: "fr-FR-RemyMultilingualNeural", name: "🇫🇷 Remy (Multilingual Male)" },
    Voice { id: "de-DE-FlorianMultilingualNeural", name: "🇩🇪 Florian (Multilingual Male)" },
    Voice { id: "en-US-ChristopherMultilingualNeural", name: "🇺🇸 Christopher (Multilingual Male)" },
    Voice { id: "en-US-EricMultilingualNeural", name: "🇺🇸 Eric (Multilingual Male)" },
    Voice { id: "en-US-RogerMultilingualNeural", name: "🇺🇸 Roger (Multilingual Male)" },
    Voice { id: "en-US-SteffanMultilingualNeural", name: "🇺🇸 Steffan (Multilingual Male)" },
    Voice { id: "zh-CN-YunfanMultilingualNeural", name: "🇨🇳 Yunfan (Multilingual Male)" },
    Voice { id: "zh-CN-YunxiaoMultilingualNeural", name: "🇨🇳 Yunxiao (Multilingual Male)" },
    // Multilingual female
    Voice { id: "en-US-AvaMultilingualNeural", name: "🇺🇸 Ava (Multilingual Female)" },
    Voice { id: "en-US-EmmaMultilingualNeural", name: "🇺🇸 Emma (Multilingual Female)" },
    Voice { id: "en-US-JennyMultilingualNeural", name: "🇺🇸 Jenny (Multilingual Female)" },
    Voice { id: "fr-FR-VivienneMultilingualNeural", name: "🇫🇷 Vivienne (Multilingual Female)" },
    Voice { id: "de-DE-SeraphinaMultilingualNeural", name: "🇩🇪 Seraphina (Multilingual Female)" },
    Voice { id: "en-US-MichelleMultilingualNeural", name: "🇺🇸 Michelle (Multilingual Female)" },
    Voice { id: "en-US-AlyssaMultilingualNeural", name: "🇺🇸 Alyssa (Multilingual Female)" },
    Voice { id: "en-US-BriannaMultilingualNeural", name: "🇺🇸 Brianna (Multilingual Female)" },
    Voice { id: "pt-BR-ThalitaMultilingualNeural", name: "🇧🇷 Thalita (Multilingual Female)" },
    Voice { id: "zh-CN-XiaoxiaoMultilingualNeural", name: "🇨🇳 Xiaoxiao (Multilingual Female)" },
];

pub fn find_voice(id: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.id == id)
}

/// Language code of a voice identifier, e.g. `ru` for `ru-RU-DmitryNeural`
pub fn language_of(voice: &str) -> String {
    voice
        .split('-')
        .next()
        .filter(|lang| !lang.is_empty())
        .unwrap_or("ru")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog() {
        assert_eq!(VOICES.len(), 23);
        assert!(find_voice(DEFAULT_VOICE).is_some());
        assert!(find_voice("xx-XX-Nobody").is_none());
    }

    #[test]
    fn test_language_of() {
        assert_eq!(language_of("ru-RU-DmitryNeural"), "ru");
        assert_eq!(language_of("pt-BR-ThalitaMultilingualNeural"), "pt");
        assert_eq!(language_of(""), "ru");
    }
}
