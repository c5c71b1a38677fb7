//! Model instructions and the text blocks the selector shows the model.
//!
//! Vacancy data is Russian-language, so the instructions are too.

use crate::vacancies::Vacancy;

pub const QUERY_ENRICHMENT_PROMPT: &str = "\
Ты помогаешь искать вакансии для финансовых специалистов. \
Перепиши резюме пользователя в виде поискового запроса: сохрани должности, \
опыт и навыки, добавь синонимы названий должностей и профильные финансовые \
термины (отчетность, МСФО, РСБУ, бюджетирование, финансовый анализ и т.п.), \
если они следуют из резюме. Не выдумывай опыт, которого нет. \
Верни только текст запроса без пояснений.";

const STAGE1_PROMPT: &str = "\
Ты карьерный консультант для финансовых специалистов. \
Тебе дано резюме и список вакансий в формате \"id: название\", \
отсортированный по убыванию релевантности. \
Выбери не более {limit} вакансий, названия которых лучше всего подходят \
под опыт и навыки кандидата. \
Верни JSON вида {\"selected\": [id, ...]} только с id из списка.";

const STAGE2_PROMPT: &str = "\
Ты карьерный консультант для финансовых специалистов. \
Тебе дано резюме и подробные описания вакансий. \
Оцени требования, обязанности, навыки и опыт и выбери не более {limit} \
вакансий, наиболее подходящих кандидату, от лучшей к худшей. \
Верни JSON вида {\"selected\": [id, ...]} только с id из списка.";

pub fn stage1_instruction(limit: usize) -> String {
    STAGE1_PROMPT.replace("{limit}", &limit.to_string())
}

pub fn stage2_instruction(limit: usize) -> String {
    STAGE2_PROMPT.replace("{limit}", &limit.to_string())
}

/// Title-only listing, one `id: title` per candidate.
pub fn stage1_context(resume: &str, candidates: &[Vacancy]) -> String {
    let list_text = candidates
        .iter()
        .map(|v| format!("{}: {}", v.idx, v.title))
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        "Резюме финансового специалиста:\n{resume}\n\n\
         Список финансовых вакансий (id: название):\n{list_text}"
    )
}

pub fn stage2_context(resume: &str, candidates: &[Vacancy]) -> String {
    let details = candidates
        .iter()
        .map(vacancy_block)
        .collect::<Vec<_>>()
        .join("\n------\n");

    format!("Резюме финансового специалиста:\n{resume}\n\nВакансии (подробно):\n{details}")
}

/// Full detail block for one vacancy. Empty attributes are left out; the id
/// line is always present.
pub fn vacancy_block(vacancy: &Vacancy) -> String {
    let mut parts = vec![format!("idx: {}", vacancy.idx)];

    let fields = [
        ("Название", &vacancy.title),
        ("Описание", &vacancy.description),
        ("Навыки", &vacancy.key_skills),
        ("Компания", &vacancy.company),
        ("Локация", &vacancy.location),
        ("Зарплата", &vacancy.salary),
        ("Опыт", &vacancy.experience),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            parts.push(format!("{label}: {value}"));
        }
    }

    parts.join("\n")
}

pub fn seniority_prompt(vacancy: &Vacancy) -> String {
    let description: String = vacancy.description.to_lowercase().chars().take(200).collect();

    format!(
        "Определи уровень позиции по следующей вакансии:\n\n\
         Название: {title}\n\
         Опыт: {experience}\n\
         Описание (первые 200 символов): {description}\n\n\
         Выбери ОДИН из уровней:\n\
         - Стажер (для позиций без опыта, с обучением)\n\
         - Начальный (junior, младший, для кандидатов с минимальным опытом до 1-2 лет)\n\
         - Средний (middle, для кандидатов с опытом 1-3 года)\n\
         - Продвинутый (senior, старший, для кандидатов с опытом 3+ лет)\n\
         - Эксперт (expert, principal, для высококвалифицированных специалистов)\n\
         - Руководитель (руководящие позиции: директор, руководитель, head, chief)\n\n\
         Верни ТОЛЬКО название уровня без дополнительных комментариев.",
        title = vacancy.title,
        experience = vacancy.experience,
    )
}
