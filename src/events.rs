use chrono::NaiveDate;

/// One public model release used for chart annotation. The catalog is fixed
/// and compiled in; release date is first public availability (API, paper,
/// or product launch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub model: &'static str,
    pub org: &'static str,
    pub date: NaiveDate,
    /// Hex color inherited from the organization.
    pub color: &'static str,
}

const RELEASES: &[(&str, &str, (i32, u32, u32))] = &[
    ("GPT-3", "OpenAI", (2020, 6, 11)),
    ("GitHub Copilot", "Microsoft", (2021, 6, 29)),
    ("CodeX", "OpenAI", (2021, 8, 10)),
    ("ChatGPT", "OpenAI", (2022, 11, 30)),
    ("Llama 1", "Meta", (2023, 2, 24)),
    ("GPT-4", "OpenAI", (2023, 3, 14)),
    ("Claude 1", "Anthropic", (2023, 3, 14)),
    ("Bard", "Google", (2023, 3, 21)),
    ("PaLM 2", "Google", (2023, 5, 10)),
    ("Falcon 40B", "Other", (2023, 5, 23)),
    ("Claude 2", "Anthropic", (2023, 7, 11)),
    ("Llama 2", "Meta", (2023, 7, 18)),
    ("Mistral 7B", "Mistral", (2023, 9, 27)),
    ("GPT-4 Turbo", "OpenAI", (2023, 11, 6)),
    ("Gemini 1.0", "Google", (2023, 12, 6)),
    ("Mixtral 8x7B", "Mistral", (2023, 12, 11)),
    ("Gemini 1.5 Pro", "Google", (2024, 2, 15)),
    ("Claude 3 Opus", "Anthropic", (2024, 3, 4)),
    ("DBRX", "Other", (2024, 3, 27)),
    ("Llama 3 8/70B", "Meta", (2024, 4, 18)),
    ("GPT-4o", "OpenAI", (2024, 5, 13)),
    ("Claude 3.5 Sonnet", "Anthropic", (2024, 6, 20)),
    ("GPT-4o mini", "OpenAI", (2024, 7, 18)),
    ("Llama 3.1 405B", "Meta", (2024, 7, 23)),
    ("Mistral Large 2", "Mistral", (2024, 7, 24)),
    ("Grok-2", "xAI", (2024, 8, 13)),
    ("o1-preview", "OpenAI", (2024, 9, 12)),
    ("Llama 3.2", "Meta", (2024, 9, 25)),
    ("Claude 3.5 Haiku", "Anthropic", (2024, 10, 22)),
    ("Gemini 2.0 Flash", "Google", (2024, 12, 11)),
    ("DeepSeek V3", "DeepSeek", (2024, 12, 26)),
    ("DeepSeek R1", "DeepSeek", (2025, 1, 20)),
    ("o3-mini", "OpenAI", (2025, 1, 31)),
    ("Gemini 2.0 Pro", "Google", (2025, 2, 5)),
    ("Claude 3.7 Sonnet", "Anthropic", (2025, 2, 24)),
    ("Gemini 2.5 Pro", "Google", (2025, 3, 25)),
    ("Llama 4", "Meta", (2025, 4, 5)),
    ("GPT-4.1", "OpenAI", (2025, 4, 14)),
    ("Claude 4 Sonnet", "Anthropic", (2025, 5, 22)),
];

pub fn org_color(org: &str) -> &'static str {
    match org {
        "OpenAI" => "#10a37f",
        "Anthropic" => "#c97d4e",
        "Google" => "#4285f4",
        "Meta" => "#1877f2",
        "Mistral" => "#7c3aed",
        "Microsoft" => "#00a4ef",
        "Cohere" => "#d946ef",
        "xAI" => "#000000",
        "DeepSeek" => "#e11d48",
        _ => "#6b7280",
    }
}

pub fn all_releases() -> Vec<ReleaseEvent> {
    RELEASES
        .iter()
        .filter_map(|&(model, org, (year, month, day))| {
            NaiveDate::from_ymd_opt(year, month, day).map(|date| ReleaseEvent {
                model,
                org,
                date,
                color: org_color(org),
            })
        })
        .collect()
}

/// Releases dated within `[start, end]`, in chronological order.
pub fn releases_between(start: NaiveDate, end: NaiveDate) -> Vec<ReleaseEvent> {
    let mut events: Vec<ReleaseEvent> = all_releases()
        .into_iter()
        .filter(|event| event.date >= start && event.date <= end)
        .collect();
    events.sort_by_key(|event| event.date);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn catalog_has_valid_dates_and_colors() {
        let releases = all_releases();
        assert_eq!(releases.len(), RELEASES.len());
        for release in &releases {
            assert!(release.color.starts_with('#'));
            assert_eq!(release.color.len(), 7);
        }
    }

    #[test]
    fn range_filter_is_inclusive_and_sorted() {
        let events = releases_between(date(2022, 11, 30), date(2023, 3, 14));
        let models: Vec<&str> = events.iter().map(|event| event.model).collect();
        assert_eq!(models, ["ChatGPT", "Llama 1", "GPT-4", "Claude 1"]);
        for pair in events.windows(2) {
            assert!(pair[0].date <= pair[1].date);
        }
    }

    #[test]
    fn unknown_org_falls_back_to_gray() {
        assert_eq!(org_color("Nobody"), "#6b7280");
    }
}
