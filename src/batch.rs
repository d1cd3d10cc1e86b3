use tracing::warn;

/// Placed between two rendered cards inside one message.
pub const SEPARATOR: &str = "\n\n";

/// One outbound chat message holding part or all of a stack's cards.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup {
    pub title: String,
    pub body: String,
    /// Board title and timestamp; only the first group of a cycle carries one
    pub banner: Option<String>,
}

impl MessageGroup {
    /// Body size in the unit chat services count: characters.
    pub fn body_len(&self) -> usize {
        self.body.chars().count()
    }
}

fn continued_title(stack_title: &str) -> String {
    format!("{} (continued)", stack_title)
}

/// Greedily pack rendered cards into groups whose bodies stay within `limit`
/// characters, preserving card order and never splitting a card.
///
/// A single card longer than `limit` is emitted alone in its own group
/// untouched; that is the only way a group can exceed the limit.
pub fn pack_stack(stack_title: &str, cards: Vec<String>, limit: usize) -> Vec<MessageGroup> {
    let separator_len = SEPARATOR.chars().count();
    let mut groups: Vec<MessageGroup> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    let close = |current: &mut Vec<String>, groups: &mut Vec<MessageGroup>| {
        let title = if groups.is_empty() {
            stack_title.to_string()
        } else {
            continued_title(stack_title)
        };
        groups.push(MessageGroup {
            title,
            body: current.join(SEPARATOR),
            banner: None,
        });
        current.clear();
    };

    for card in cards {
        let card_len = card.chars().count();

        if !current.is_empty() && current_len + separator_len + card_len > limit {
            close(&mut current, &mut groups);
        }

        if current.is_empty() {
            if card_len > limit {
                warn!(
                    "Card in stack '{}' is {} characters, over the {} limit; sending it on its own",
                    stack_title, card_len, limit
                );
            }
            current_len = card_len;
        } else {
            current_len += separator_len + card_len;
        }
        current.push(card);
    }

    if !current.is_empty() {
        close(&mut current, &mut groups);
    }

    groups
}
