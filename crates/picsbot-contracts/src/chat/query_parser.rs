use super::command_registry::{
    QueryRule, CLOSING_QUOTES, COLLAGE_MAX_IMAGES, COLLAGE_MIN_IMAGES, OPENING_QUOTES,
    QUERY_RULES, TEXT_KEYWORD,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayText {
    Literal(String),
    /// A phrase drawn from this category when the request is executed.
    Category(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Plain,
    Collage,
    Overlay,
    CollageWithText,
    CategoryPhrase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRequest {
    Plain {
        search_term: Option<String>,
    },
    Collage {
        count: u8,
        search_term: Option<String>,
    },
    Overlay {
        text: String,
        search_term: Option<String>,
    },
    CollageWithText {
        count: u8,
        overlay: OverlayText,
        search_term: Option<String>,
    },
    CategoryPhrase {
        category: String,
        search_term: Option<String>,
    },
}

impl ImageRequest {
    pub fn mode(&self) -> QueryMode {
        match self {
            Self::Plain { .. } => QueryMode::Plain,
            Self::Collage { .. } => QueryMode::Collage,
            Self::Overlay { .. } => QueryMode::Overlay,
            Self::CollageWithText { .. } => QueryMode::CollageWithText,
            Self::CategoryPhrase { .. } => QueryMode::CategoryPhrase,
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        match self {
            Self::Plain { search_term }
            | Self::Collage { search_term, .. }
            | Self::Overlay { search_term, .. }
            | Self::CollageWithText { search_term, .. }
            | Self::CategoryPhrase { search_term, .. } => search_term.as_deref(),
        }
    }

    /// Number of source images the request needs.
    pub fn count(&self) -> u8 {
        match self {
            Self::Collage { count, .. } | Self::CollageWithText { count, .. } => *count,
            _ => 1,
        }
    }

    pub fn overlay(&self) -> Option<OverlayText> {
        match self {
            Self::Overlay { text, .. } => Some(OverlayText::Literal(text.clone())),
            Self::CollageWithText { overlay, .. } => Some(overlay.clone()),
            Self::CategoryPhrase { category, .. } => Some(OverlayText::Category(category.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    categories: Vec<String>,
}

impl QueryParser {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|value| value.as_ref().trim().to_string())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn parse(&self, raw: &str) -> ImageRequest {
        let text = raw.trim();
        for rule in QUERY_RULES {
            let matched = match rule {
                QueryRule::Empty => parse_empty(text),
                QueryRule::Collage => self.parse_collage(text),
                QueryRule::TextOverlay => parse_text_overlay(text),
                QueryRule::Category => self.parse_category(text),
                QueryRule::Literal => Some(literal(text)),
            };
            if let Some(request) = matched {
                return request;
            }
        }
        literal(text)
    }

    fn find_category(&self, token: &str) -> Option<&str> {
        let lowered = token.to_lowercase();
        self.categories
            .iter()
            .find(|category| category.to_lowercase() == lowered)
            .map(String::as_str)
    }

    fn parse_collage(&self, text: &str) -> Option<ImageRequest> {
        let mut tokens = text.split_whitespace();
        let count = parse_count_token(tokens.next()?)?;
        let rest: Vec<&str> = tokens.collect();
        if let Some(category) = rest.first().and_then(|token| self.find_category(token)) {
            return Some(ImageRequest::CollageWithText {
                count,
                overlay: OverlayText::Category(category.to_string()),
                search_term: join_terms(&rest[1..]),
            });
        }
        Some(ImageRequest::Collage {
            count,
            search_term: join_terms(&rest),
        })
    }

    fn parse_category(&self, text: &str) -> Option<ImageRequest> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let category = self.find_category(tokens.first()?)?;
        Some(ImageRequest::CategoryPhrase {
            category: category.to_string(),
            search_term: join_terms(&tokens[1..]),
        })
    }
}

fn parse_empty(text: &str) -> Option<ImageRequest> {
    if text.is_empty() {
        return Some(ImageRequest::Plain { search_term: None });
    }
    None
}

fn parse_text_overlay(text: &str) -> Option<ImageRequest> {
    let keyword = text.split_whitespace().next()?;
    if !keyword.eq_ignore_ascii_case(TEXT_KEYWORD) {
        return None;
    }
    let after_keyword = text[keyword.len()..].trim_start();
    let quoted = after_keyword.strip_prefix(OPENING_QUOTES)?;
    let Some(close) = quoted.find(CLOSING_QUOTES) else {
        return Some(literal(text));
    };
    let phrase = quoted[..close].trim();
    if phrase.is_empty() {
        return Some(literal(text));
    }
    let close_len = quoted[close..].chars().next().map_or(1, char::len_utf8);
    let remainder: Vec<&str> = quoted[close + close_len..].split_whitespace().collect();

    if let Some(count) = remainder.first().and_then(|token| parse_count_token(token)) {
        return Some(ImageRequest::CollageWithText {
            count,
            overlay: OverlayText::Literal(phrase.to_string()),
            search_term: join_terms(&remainder[1..]),
        });
    }
    Some(ImageRequest::Overlay {
        text: phrase.to_string(),
        search_term: join_terms(&remainder),
    })
}

fn literal(text: &str) -> ImageRequest {
    ImageRequest::Plain {
        search_term: if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        },
    }
}

/// Integer tokens clamp to the collage range, including ones too large for
/// any integer type.
fn parse_count_token(token: &str) -> Option<u8> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let value = match digits.parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    };
    Some(value.clamp(i64::from(COLLAGE_MIN_IMAGES), i64::from(COLLAGE_MAX_IMAGES)) as u8)
}

fn join_terms(tokens: &[&str]) -> Option<String> {
    if tokens.is_empty() {
        return None;
    }
    Some(tokens.join(" "))
}
