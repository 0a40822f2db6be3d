//! 语音交互: 命令解析, 语音输出, 对话历史
pub mod commands;
pub mod conversation;
pub mod speech;

pub use commands::{parse_command, parse_input, parse_key, HELP_TEXT};
pub use conversation::{ConversationHistory, Role, Turn};
pub use speech::{
    split_pauses, strip_emoji, CancelToken, ProcessSpeaker, Speaker, SpeechSegment, SpeechToText,
    VoiceAssistant,
};
