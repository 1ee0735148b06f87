#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Load,
    Translate,
    Push,
    PushAll,
    Undo,
    CopySource,
    Filter,
    Search,
    Page,
    View,
    Stats,
    Tick,
    Focus,
    Blur,
    SpellcheckOpen,
    SpellcheckAccept,
    SpellcheckIgnore,
    SpellcheckIgnoreAll,
    SpellcheckClose,
    Suggest,
    SaveAndExit,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "load" => Command::Load,
            "translate" => Command::Translate,
            "push" => Command::Push,
            "push_all" => Command::PushAll,
            "undo" => Command::Undo,
            "copy_source" => Command::CopySource,
            "filter" => Command::Filter,
            "search" => Command::Search,
            "page" => Command::Page,
            "view" => Command::View,
            "stats" => Command::Stats,
            "tick" => Command::Tick,
            "focus" => Command::Focus,
            "blur" => Command::Blur,
            "spellcheck.open" => Command::SpellcheckOpen,
            "spellcheck.accept" => Command::SpellcheckAccept,
            "spellcheck.ignore" => Command::SpellcheckIgnore,
            "spellcheck.ignore_all" => Command::SpellcheckIgnoreAll,
            "spellcheck.close" => Command::SpellcheckClose,
            "suggest" => Command::Suggest,
            "save_and_exit" => Command::SaveAndExit,
            _ => Command::Unknown,
        }
    }
}

impl Command {
    /// Commands that fire due timers themselves, or need no string set.
    pub fn skips_pretick(self) -> bool {
        matches!(self, Command::Ping | Command::Load | Command::Tick | Command::Unknown)
    }
}
