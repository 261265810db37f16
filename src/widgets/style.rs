//! Inline `style` attributes of template markup

/// Geometry read from a `style` attribute, on top of per-element defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetStyle {
    pub width: u32,
    pub height: u32,
    pub resize: String,
    pub margin: String,
}

impl WidgetStyle {
    /// Defaults for an element kind
    pub fn defaults(element: &str) -> Self {
        let (width, height) = match element {
            "tree" => (40, 10),
            "select" => (20, 1),
            "dialog" => (400, 300),
            _ => (0, 0),
        };
        Self {
            width,
            height,
            resize: "none".to_string(),
            margin: "0".to_string(),
        }
    }

    pub fn parse(element: &str, style: Option<&str>) -> Self {
        let mut parsed = Self::defaults(element);
        for (property, value) in declarations(style.unwrap_or_default()) {
            match property {
                "width" => parsed.width = leading_number(value).unwrap_or(parsed.width),
                "height" => parsed.height = leading_number(value).unwrap_or(parsed.height),
                "resize" => parsed.resize = value.to_string(),
                "margin" => parsed.margin = value.to_string(),
                _ => {}
            }
        }
        parsed
    }
}

/// `property: value` pairs of a style attribute, trimmed, in order
pub fn declarations(style: &str) -> impl Iterator<Item = (&str, &str)> {
    style.split(';').filter_map(|declaration| {
        let (property, value) = declaration.split_once(':')?;
        Some((property.trim(), value.trim()))
    })
}

/// `30` from `30ch`, `30px` or `30`
fn leading_number(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
