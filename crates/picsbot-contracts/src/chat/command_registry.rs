/// One step of the inline-query grammar. [`QUERY_RULES`] lists them in
/// priority order; the first rule that matches decides the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryRule {
    Empty,
    Collage,
    TextOverlay,
    Category,
    Literal,
}

pub const QUERY_RULES: &[QueryRule] = &[
    QueryRule::Empty,
    QueryRule::Collage,
    QueryRule::TextOverlay,
    QueryRule::Category,
    QueryRule::Literal,
];

pub(crate) const TEXT_KEYWORD: &str = "text";

pub(crate) const OPENING_QUOTES: &[char] = &['"', '“', '«'];
pub(crate) const CLOSING_QUOTES: &[char] = &['"', '”', '»'];

pub const COLLAGE_MIN_IMAGES: u8 = 2;
pub const COLLAGE_MAX_IMAGES: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonSpec {
    pub action: &'static str,
    pub label: &'static str,
    /// Inline-query text the button stands for.
    pub query: &'static str,
    /// Phrase category the query relies on, if any.
    pub category: Option<&'static str>,
}

pub const BUTTON_ACTIONS: &[ButtonSpec] = &[
    ButtonSpec {
        action: "send_random_img",
        label: "Send a random picture",
        query: "",
        category: None,
    },
    ButtonSpec {
        action: "send_collage",
        label: "Send a random collage",
        query: "4",
        category: None,
    },
    ButtonSpec {
        action: "send_motivation",
        label: "Send some motivation",
        query: "motivation",
        category: Some("motivation"),
    },
];

pub const MENTION_PROMPT: &str = "What do you want to do?";

pub fn find_button(action: &str) -> Option<&'static ButtonSpec> {
    BUTTON_ACTIONS.iter().find(|spec| spec.action == action)
}
