//! Canned chat assistant.
//!
//! Replies are picked by case-insensitive substring match over an ordered
//! rule table; the first rule with a matching keyword wins and a fallback
//! reply covers everything else. There is no model behind it.

struct Rule {
    keywords: &'static [&'static str],
    reply: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["html"],
        reply: "I can help you with HTML! Try asking me to create a specific element, explain HTML tags, or generate HTML code.",
    },
    Rule {
        keywords: &["css"],
        reply: "CSS is great for styling! I can help with layouts, colors, animations, responsive design, and more.",
    },
    Rule {
        keywords: &["javascript", "js"],
        reply: "JavaScript brings your pages to life! I can help with functions, event handling, DOM manipulation, and more.",
    },
    Rule {
        keywords: &["help"],
        reply: "I'm here to help! Ask me about HTML, CSS, JavaScript, web development, or how to use this editor.",
    },
    Rule {
        keywords: &["thank"],
        reply: "You're welcome! Feel free to ask if you need more help with your coding projects.",
    },
];

pub const FALLBACK_REPLY: &str = "That's an interesting question! I can help with web development topics. Try asking me about HTML, CSS, or JavaScript, or say \"help\" for more options.";

/// Reply to a chat message. Blank input gets no reply.
pub fn respond(message: &str) -> Option<&'static str> {
    if message.trim().is_empty() {
        return None;
    }
    let lower = message.to_lowercase();
    let reply = RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
        .map(|rule| rule.reply)
        .unwrap_or(FALLBACK_REPLY);
    Some(reply)
}
