//! Compiled-in safety library, served only when the store's library query fails.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::prompt::{Category, Difficulty, PromptTemplate};

struct Entry {
    id: u128,
    text: &'static str,
    category: Category,
    difficulty: Difficulty,
    follow_ups: &'static [&'static str],
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0001,
        text: "Describe the home you remember most from your childhood. What did it smell like?",
        category: Category::Childhood,
        difficulty: Difficulty::Easy,
        follow_ups: &["Which room did you spend the most time in?", "Who else lived there?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0002,
        text: "What games did you play with your friends when you were young?",
        category: Category::Childhood,
        difficulty: Difficulty::Easy,
        follow_ups: &["Who always won?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0003,
        text: "Tell me about a family tradition you hope never disappears.",
        category: Category::Traditions,
        difficulty: Difficulty::Medium,
        follow_ups: &["Who started it?", "How has it changed over the years?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0004,
        text: "What was your very first job, and what did you learn from it?",
        category: Category::Career,
        difficulty: Difficulty::Easy,
        follow_ups: &["How much were you paid?", "Who was your boss?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0005,
        text: "Describe a moment at work when you felt truly proud of yourself.",
        category: Category::Career,
        difficulty: Difficulty::Medium,
        follow_ups: &["Did anyone else notice?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0006,
        text: "How did you meet the person who became most important in your life?",
        category: Category::Relationships,
        difficulty: Difficulty::Medium,
        follow_ups: &["What was your first impression?", "What did you talk about?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0007,
        text: "Tell me about a trip that changed how you see the world.",
        category: Category::Travel,
        difficulty: Difficulty::Medium,
        follow_ups: &["What surprised you most?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0008,
        text: "What is a story about your parents that you want your grandchildren to know?",
        category: Category::Family,
        difficulty: Difficulty::Deep,
        follow_ups: &["How did you first hear this story?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_0009,
        text: "Which teacher or mentor shaped who you became, and how?",
        category: Category::Education,
        difficulty: Difficulty::Medium,
        follow_ups: &["Did you ever tell them?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_000a,
        text: "Describe a day that divided your life into before and after.",
        category: Category::Milestones,
        difficulty: Difficulty::Deep,
        follow_ups: &["What did you do the next morning?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_000b,
        text: "What was the hardest decision you ever made, and would you make it again?",
        category: Category::Reflections,
        difficulty: Difficulty::Deep,
        follow_ups: &["Who did you turn to for advice?"],
    },
    Entry {
        id: 0x5f1b_0001_0000_4000_8000_0000_0000_000c,
        text: "What advice would you give your twenty-year-old self?",
        category: Category::Reflections,
        difficulty: Difficulty::Medium,
        follow_ups: &["Would they have listened?"],
    },
];

/// The built-in library as templates.
pub fn builtin_library() -> Vec<PromptTemplate> {
    ENTRIES
        .iter()
        .map(|e| PromptTemplate {
            id: Uuid::from_u128(e.id),
            text: e.text.to_string(),
            category: e.category,
            difficulty: e.difficulty,
            tags: BTreeSet::from(["builtin".to_string(), e.category.as_str().to_string()]),
            follow_up_questions: e.follow_ups.iter().map(|q| q.to_string()).collect(),
            audio_ref: None,
        })
        .collect()
}
