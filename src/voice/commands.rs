//! 文本 / 按键 → 控制命令

use crate::mode::NavigationMode;
use crate::state::Command;
use once_cell::sync::Lazy;
use regex::Regex;

pub const HELP_TEXT: &str = "I'm Nova. You can ask me to track objects, describe the scene, \
read text, or ask where you left something.";

static RECALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^where(?:'s| is| are| did i (?:leave|put))\s+(?:my |the |a |an )?(.+)$").expect("static regex")
});
static TRACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:track|find|follow|navigate to|take me to|guide me to)\s+(?:my |the |a |an )?(.+)$")
        .expect("static regex")
});
static MODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(\w+) mode\b|^(?:switch to|mode) (\w+)$)").expect("static regex")
});

fn mode_from_word(word: &str) -> Option<NavigationMode> {
    match word {
        "normal" => Some(NavigationMode::Exploration),
        other => other.parse().ok(),
    }
}

/// 解析一句话
///
/// 无法识别的句子作为视觉问答 (Ask) 处理。
pub fn parse_command(text: &str) -> Option<Command> {
    let lower = text
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    if lower.is_empty() {
        return None;
    }

    match lower.as_str() {
        "quit" | "exit" | "goodbye" | "shut down" => return Some(Command::Quit),
        "stop" | "stop tracking" | "cancel" => return Some(Command::StopTracking),
        "help" | "what can you do" => return Some(Command::Say(HELP_TEXT.to_string())),
        "scan" | "detect" | "rescan" => return Some(Command::Detect),
        "next mode" => return Some(Command::CycleMode),
        _ => {}
    }

    if let Some(caps) = RECALL.captures(&lower) {
        return Some(Command::Recall(caps[1].trim().to_string()));
    }
    if let Some(caps) = TRACK.captures(&lower) {
        return Some(Command::Track(caps[1].trim().to_string()));
    }
    if let Some(caps) = MODE.captures(&lower) {
        let word = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        if let Some(mode) = mode_from_word(word) {
            return Some(Command::SetMode(mode));
        }
    }
    if lower.contains("describe")
        || lower.contains("what's around")
        || lower.contains("what is around")
        || lower.contains("scene")
    {
        return Some(Command::DescribeScene);
    }
    // 其余都是针对当前画面的问题
    Some(Command::Ask(text.trim().to_string()))
}

/// 单键快捷方式
pub fn parse_key(key: char) -> Option<Command> {
    match key.to_ascii_lowercase() {
        'q' => Some(Command::Quit),
        'f' | 'r' => Some(Command::Detect),
        'm' => Some(Command::CycleMode),
        'n' => Some(Command::SetMode(NavigationMode::Exploration)),
        'd' => Some(Command::DescribeScene),
        'x' => Some(Command::StopTracking),
        'h' => Some(Command::Say(HELP_TEXT.to_string())),
        _ => None,
    }
}

/// 终端输入: 单个字符按快捷键处理, 其余按语音文本处理
pub fn parse_input(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => parse_key(c),
        _ => parse_command(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_recall() {
        assert_eq!(parse_command("Find my keys."), Some(Command::Track("keys".into())));
        assert_eq!(parse_command("take me to the door"), Some(Command::Track("door".into())));
        assert_eq!(
            parse_command("Where did I leave my phone?"),
            Some(Command::Recall("phone".into()))
        );
        assert_eq!(parse_command("where's the cup"), Some(Command::Recall("cup".into())));
    }

    #[test]
    fn test_modes() {
        assert_eq!(
            parse_command("obstacle mode"),
            Some(Command::SetMode(NavigationMode::Obstacle))
        );
        assert_eq!(
            parse_command("switch to social"),
            Some(Command::SetMode(NavigationMode::Social))
        );
        assert_eq!(
            parse_command("Normal mode"),
            Some(Command::SetMode(NavigationMode::Exploration))
        );
        assert_eq!(parse_command("next mode"), Some(Command::CycleMode));
    }

    #[test]
    fn test_fixed_phrases_and_fallback() {
        assert_eq!(parse_command("  "), None);
        assert_eq!(parse_command("Quit"), Some(Command::Quit));
        assert_eq!(parse_command("stop tracking"), Some(Command::StopTracking));
        assert_eq!(parse_command("describe the scene"), Some(Command::DescribeScene));
        assert_eq!(
            parse_command("What is this?"),
            Some(Command::Ask("What is this?".into()))
        );
        assert_eq!(
            parse_command("is it raining"),
            Some(Command::Ask("is it raining".into()))
        );
    }

    #[test]
    fn test_keys_and_input() {
        assert_eq!(parse_key('Q'), Some(Command::Quit));
        assert_eq!(parse_key('r'), Some(Command::Detect));
        assert_eq!(parse_key('z'), None);
        assert_eq!(parse_input("m\n"), Some(Command::CycleMode));
        assert_eq!(parse_input("track chair"), Some(Command::Track("chair".into())));
    }
}
