pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    error, header, import_summary, info, muted, post_detail, report_label, section,
    state_icon, status, success, summary_row, timing, warn,
};
pub use progress::Spinner;
pub use table::{embeddings_table, posts_table, stats_table, topics_table, TableBuilder};
pub use theme::{theme, Theme};
