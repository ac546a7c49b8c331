//! Word lists used to strip measurement and preparation noise from
//! ingredient lines. All entries are lowercase single tokens.

/// Measurement and count units, short and long forms.
pub const UNITS: &[&str] = &[
    // mass
    "g", "gr", "gram", "grams", "kg", "kgs", "kilo", "kilos", "kilogram", "kilograms", "mg",
    "milligram", "milligrams", "oz", "ounce", "ounces", "lb", "lbs", "pound", "pounds",
    // volume
    "ml", "millilitre", "millilitres", "milliliter", "milliliters", "l", "litre", "litres",
    "liter", "liters", "cl", "dl", "tsp", "tsps", "teaspoon", "teaspoons", "tbsp", "tbsps",
    "tbs", "tablespoon", "tablespoons", "fl", "cup", "cups", "pt", "pint", "pints", "qt",
    "quart", "quarts", "gal", "gallon", "gallons",
    // counts
    "pinch", "pinches", "dash", "dashes", "clove", "cloves", "head", "heads", "slice",
    "slices", "piece", "pieces", "can", "cans", "tin", "tins", "jar", "jars", "packet",
    "packets", "pack", "packs", "bunch", "bunches", "sprig", "sprigs", "handful", "handfuls",
    "stick", "sticks", "sheet", "sheets", "knob",
    // fractions spelled out
    "half", "halves", "quarter", "quarters", "third", "thirds",
];

/// Preparation, size, state and serving words that do not identify an ingredient.
pub const DESCRIPTORS: &[&str] = &[
    "fresh", "freshly", "dried", "frozen", "canned", "cooked", "uncooked", "raw", "chopped",
    "diced", "sliced", "minced", "grated", "crushed", "peeled", "seeded", "deseeded", "large",
    "medium", "small", "ripe", "unripe", "optional", "plain", "all-purpose", "self-raising",
    "self-rising", "whole", "ground", "granulated", "powdered", "boneless", "skinless",
    "finely", "coarsely", "roughly", "thinly", "hot", "cold", "warm", "chilled", "sweet",
    "unsweetened", "salted", "unsalted", "softened", "melted", "beaten", "halved",
    "quartered", "trimmed", "rinsed", "drained", "taste", "garnish", "serving", "needed",
    "divided", "heaped", "level", "rounded",
];

/// Grammar words and vague quantifiers.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "and", "or", "with", "without", "in", "on", "at", "for", "to",
    "from", "some", "any", "about", "into", "over", "under", "x", "plus", "each", "per",
    "approx", "approximately", "few", "extra", "more", "if",
];

pub fn is_unit(word: &str) -> bool {
    UNITS.contains(&word)
}

pub fn is_descriptor(word: &str) -> bool {
    DESCRIPTORS.contains(&word)
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabularies_are_lowercase_tokens() {
        for word in UNITS.iter().chain(DESCRIPTORS).chain(STOP_WORDS) {
            assert_eq!(*word, word.to_lowercase());
            assert!(!word.contains(char::is_whitespace), "{word}");
        }
    }

    #[test]
    fn test_lookups() {
        assert!(is_unit("tbsp"));
        assert!(!is_unit("garlic"));
        assert!(is_descriptor("finely"));
        assert!(is_stop_word("of"));
    }
}
