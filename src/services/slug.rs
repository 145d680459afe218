//! URL slug generation
//!
//! Cyrillic is transliterated to Latin first, so Russian titles produce
//! readable ASCII slugs ("Стрижка бороды" -> "strizhka-borody").

/// Latin spelling of a lowercase Cyrillic letter
fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "io",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "iu",
        'я' => "ia",
        _ => return None,
    };
    Some(latin)
}

/// Generate a slug: lowercase ASCII letters, digits and single hyphens,
/// with no hyphen at either end. Characters that cannot be transliterated
/// act as separators.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.to_lowercase().chars() {
        let piece: std::borrow::Cow<'static, str> = if c.is_ascii_alphanumeric() {
            c.to_string().into()
        } else if let Some(latin) = transliterate(c) {
            latin.into()
        } else {
            pending_hyphen = true;
            continue;
        };

        if piece.is_empty() {
            continue;
        }
        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        slug.push_str(&piece);
    }

    slug
}

/// Slug for `text`, falling back to `fallback` when nothing usable remains
pub fn slugify_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_cyrillic() {
        assert_eq!(slugify("Стрижка бороды"), "strizhka-borody");
        assert_eq!(slugify("Щётка и ёж"), "shchiotka-i-iozh");
        assert_eq!(slugify("Подъезд"), "podezd");
    }

    #[test]
    fn test_slugify_ascii_and_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rust   2024--  "), "rust-2024");
        assert_eq!(slugify("snake_case_name"), "snake-case-name");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_or() {
        assert_eq!(slugify_or("???", "post"), "post");
        assert_eq!(slugify_or("Бритьё", "post"), "britio");
    }

    proptest! {
        #[test]
        fn slug_is_url_safe(text in "\\PC{0,40}") {
            let slug = slugify(&text);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugify_is_idempotent(text in "[a-zA-Zа-яА-Я0-9 ,.!-]{0,40}") {
            let once = slugify(&text);
            prop_assert_eq!(slugify(&once), once.clone());
        }
    }
}
