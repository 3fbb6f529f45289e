//! Free-text ingredient line parsing: "1 1/2 cups rolled oats, toasted".

/// Grams assumed when a line carries no usable quantity and unit.
pub const DEFAULT_GRAMS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIngredient {
    /// Search term for the nutrition lookup.
    pub name: String,
    pub grams: f64,
}

/// Convert a quantity in `unit` to grams. Volume units are taken at the
/// density of water.
#[must_use]
pub fn convert_to_grams(quantity: f64, unit: &str) -> Option<f64> {
    let lower = unit.to_lowercase();
    let lower = lower.trim_end_matches('.');
    match lower {
        "g" | "gram" | "grams" => Some(quantity),
        "kg" | "kilogram" | "kilograms" => Some(quantity * 1000.0),
        "lb" | "lbs" | "pound" | "pounds" => Some(quantity * 454.0),
        "oz" | "ounce" | "ounces" => Some(quantity * 28.35),
        "tbsp" | "tbs" | "tablespoon" | "tablespoons" => Some(quantity * 15.0),
        "tsp" | "teaspoon" | "teaspoons" => Some(quantity * 5.0),
        "cup" | "cups" | "c" => Some(quantity * 240.0),
        "pint" | "pints" | "pt" => Some(quantity * 473.0),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => Some(quantity),
        "l" | "liter" | "liters" | "litre" | "litres" => Some(quantity * 1000.0),
        _ => None,
    }
}

fn unicode_fraction(c: char) -> Option<f64> {
    match c {
        '½' => Some(0.5),
        '⅓' => Some(1.0 / 3.0),
        '⅔' => Some(2.0 / 3.0),
        '¼' => Some(0.25),
        '¾' => Some(0.75),
        '⅛' => Some(0.125),
        _ => None,
    }
}

/// A single quantity token: "2", "1.5", "3/4", "½" or "1½".
fn parse_amount(token: &str) -> Option<f64> {
    if let Some((num, den)) = token.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    let mut chars = token.chars();
    if let Some(last) = chars.next_back() {
        if let Some(frac) = unicode_fraction(last) {
            let whole = chars.as_str();
            return if whole.is_empty() {
                Some(frac)
            } else {
                whole.parse::<f64>().ok().map(|w| w + frac)
            };
        }
    }
    token.parse().ok().filter(|n: &f64| n.is_finite())
}

/// Split a line into a gram weight and a search name.
///
/// Leading amounts (including mixed numbers like "1 1/2") are summed; a
/// recognised unit converts them to grams. Without a unit the line counts as
/// [`DEFAULT_GRAMS`]. Anything after a comma or inside parentheses is
/// preparation detail and is dropped from the name.
#[must_use]
pub fn parse_ingredient(line: &str) -> ParsedIngredient {
    let cleaned = strip_parenthesized(line);
    let head = cleaned.split(',').next().unwrap_or_default();
    let mut tokens = head.split_whitespace().peekable();

    let mut quantity: Option<f64> = None;
    while let Some(amount) = tokens.peek().and_then(|t| parse_amount(t)) {
        quantity = Some(quantity.unwrap_or(0.0) + amount);
        tokens.next();
    }

    let mut grams = None;
    if let Some(q) = quantity {
        if let Some(g) = tokens.peek().and_then(|unit| convert_to_grams(q, unit)) {
            grams = Some(g);
            tokens.next();
        }
    }

    if tokens.peek().is_some_and(|t| t.eq_ignore_ascii_case("of")) {
        tokens.next();
    }
    let name = tokens.collect::<Vec<_>>().join(" ");

    ParsedIngredient {
        name: if name.is_empty() {
            head.trim().to_string()
        } else {
            name
        },
        grams: grams.unwrap_or(DEFAULT_GRAMS),
    }
}

fn strip_parenthesized(line: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_to_grams() {
        assert_eq!(convert_to_grams(2.0, "lb"), Some(908.0));
        assert_eq!(convert_to_grams(1.0, "Cup"), Some(240.0));
        assert_eq!(convert_to_grams(3.0, "tsp."), Some(15.0));
        assert_eq!(convert_to_grams(1.0, "handful"), None);
    }

    #[test]
    fn test_parse_amounts() {
        assert_eq!(parse_amount("2"), Some(2.0));
        assert_eq!(parse_amount("1.5"), Some(1.5));
        assert_eq!(parse_amount("3/4"), Some(0.75));
        assert_eq!(parse_amount("½"), Some(0.5));
        assert_eq!(parse_amount("1½"), Some(1.5));
        assert_eq!(parse_amount("1/0"), None);
        assert_eq!(parse_amount("cups"), None);
    }

    #[test]
    fn test_parse_ingredient_with_unit() {
        let parsed = parse_ingredient("1 1/2 cups rolled oats, toasted");
        assert_eq!(parsed.name, "rolled oats");
        assert!((parsed.grams - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_ingredient_strips_of_and_parentheses() {
        let parsed = parse_ingredient("200 g (about 7 oz) of dark chocolate");
        assert_eq!(parsed.name, "dark chocolate");
        assert!((parsed.grams - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_ingredient_without_unit_defaults() {
        let parsed = parse_ingredient("2 eggs");
        assert_eq!(parsed.name, "eggs");
        assert!((parsed.grams - DEFAULT_GRAMS).abs() < 1e-9);

        let parsed = parse_ingredient("salt and pepper to taste");
        assert_eq!(parsed.name, "salt and pepper to taste");
        assert!((parsed.grams - DEFAULT_GRAMS).abs() < 1e-9);
    }
}
