use dialogue_core::CacheCategory;

/// Topics that must never be answered with humor.
const HUMOR_TABOO: &[&str] = &[
    "болезнь", "больной", "инвалид", "инвалидность", "диагноз",
    "смерть", "умер", "погиб", "похороны", "потеря",
    "развод", "расстались", "ушел от нас", "бросил",
    "избиение", "насилие", "бьет", "издевается",
    "депрессия", "суицид", "хочет покончить", "травма",
    "изнасилование", "домогательства", "приставания",
];

/// Checked in order, first table with a hit wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "factual",
        &[
            "цена", "стоимость", "сколько стоит", "расценки", "тарифы",
            "курс", "курсы", "занятия", "уроки", "программа", "программы",
            "преподаватель", "тренер", "учитель", "кто ведет", "кто учит",
            "расписание", "время", "когда", "во сколько", "график",
            "возраст", "сколько лет", "подходит ли", "можно ли в",
            "группа", "сколько детей", "размер группы", "индивидуально",
            "онлайн", "формат", "как проходят", "платформа",
            "пробный урок", "первое занятие", "записаться", "запись",
            "сертификат", "документ", "результат", "гарантии",
            "скидки", "акции", "льготы", "рассрочка", "оплата",
        ],
    ),
    (
        "philosophical",
        &[
            "как правильно", "что делать с", "как быть", "как жить",
            "почему дети", "зачем детям", "в наше время", "раньше было",
            "современные дети", "поколение", "молодежь сейчас",
            "принципы воспитания", "методики воспитания", "подходы к детям",
            "смысл", "важность", "нужно ли", "стоит ли развивать",
            "что такое правильное", "как понять ребенка",
            "философия воспитания", "глубинные причины",
        ],
    ),
    (
        "problem_solving",
        &[
            "не слушается", "капризничает", "плачет", "истерики",
            "агрессивный", "дерется", "кричит", "не говорит",
            "замкнутый", "стеснительный", "боится", "тревожный",
            "не хочет", "отказывается", "ленивый", "неуверенный",
            "проблема с", "как справиться", "что делать если",
        ],
    ),
];

/// Substring keyword rules for question categories.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Question label decided by keywords alone, if any. Lead state is left
    /// to the model.
    pub fn classify(&self, input: &str, category: CacheCategory) -> Option<&'static str> {
        if category == CacheCategory::LeadState {
            return None;
        }

        let text = input.to_lowercase();
        if contains_any(&text, HUMOR_TABOO) {
            tracing::debug!("Sensitive topic detected");
            return Some("sensitive");
        }

        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, keywords)| contains_any(&text, keywords))
            .map(|(label, _)| *label)
    }

    pub fn is_humor_taboo(&self, input: &str) -> bool {
        contains_any(&input.to_lowercase(), HUMOR_TABOO)
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}
