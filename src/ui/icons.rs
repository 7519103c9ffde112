pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const OUTBOX: &str = "📤";
    pub const POST: &str = "📝";
    pub const PERSON: &str = "👤";
    pub const CLOCK: &str = "⏱️";
    pub const CALENDAR: &str = "📅";
    pub const FAKE: &str = "🔴";
    pub const VERIFIED: &str = "🟢";
    pub const UNCHECKED: &str = "⚪";
    pub const EAR: &str = "👂";
}
