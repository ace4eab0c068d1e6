// Illustration style catalog

const FALLBACK_STYLE: &str = "children book illustration, cartoon style, vibrant colors";

pub const STYLES: &[(&str, &str)] = &[
    (
        "cartoon-adventure",
        "cartoon illustration style, vibrant colors, cheerful adventure scene, children book illustration, playful expression",
    ),
    (
        "storybook-magic",
        "storybook illustration, magical fantasy scene, soft watercolor style, whimsical, dreamy atmosphere",
    ),
    (
        "superhero",
        "superhero illustration, comic book style, dynamic pose, heroic scene, bold colors",
    ),
    (
        "princess-fantasy",
        "princess illustration, fairy tale castle background, magical dress, enchanted forest, sparkles",
    ),
    (
        "space-explorer",
        "space explorer illustration, astronaut suit, planets and stars background, sci-fi adventure",
    ),
    (
        "animal-friend",
        "cute illustration with adorable animals, friendly pets, playful scene, warm colors",
    ),
];

// Unknown styles fall back to a generic prompt rather than failing
pub fn style_prompt(style: &str) -> &'static str {
    STYLES
        .iter()
        .find(|(id, _)| *id == style)
        .map(|(_, prompt)| *prompt)
        .unwrap_or(FALLBACK_STYLE)
}

pub fn build_prompt(style: &str) -> String {
    format!(
        "A child character in {}, illustration style, high quality",
        style_prompt(style)
    )
}
