mod command_registry;
mod query_parser;

pub use command_registry::{
    find_button, ButtonSpec, QueryRule, BUTTON_ACTIONS, COLLAGE_MAX_IMAGES, COLLAGE_MIN_IMAGES,
    MENTION_PROMPT, QUERY_RULES,
};
pub use query_parser::{ImageRequest, OverlayText, QueryMode, QueryParser};
