//! Lookup tables from classic rich-text editor classes to modern classes.

/// Maps one `ms-rte*` class to its modern counterpart.
///
/// Returns `None` for classes that have no modern equivalent and should be
/// dropped. Classes outside the `ms-rte` family are never passed in.
pub fn map_rte_class(class: &str) -> Option<&'static str> {
    let (family, rest) = class.strip_prefix("ms-rte")?.split_once('-')?;
    match family {
        "ThemeForeColor" => theme_slot(rest).map(theme_fore_color),
        "ThemeBackColor" => theme_slot(rest).map(|(slot, _)| theme_back_color(slot)),
        "ForeColor" => rest.parse().ok().and_then(fore_color),
        "BackColor" => rest.parse().ok().and_then(back_color),
        "FontSize" => rest.parse().ok().and_then(font_size),
        "Style" => style_preset(rest),
        // Font faces and element presets have no modern counterpart.
        _ => None,
    }
}

fn theme_slot(rest: &str) -> Option<(u8, u8)> {
    let (slot, shade) = rest.split_once('-')?;
    Some((slot.parse().ok()?, shade.parse().ok()?))
}

fn theme_fore_color((slot, shade): (u8, u8)) -> &'static str {
    match slot {
        1 | 3 => match shade {
            0 | 5 => "fontColorNeutralPrimary",
            1 | 2 => "fontColorNeutralTertiary",
            _ => "fontColorNeutralSecondary",
        },
        2 | 4 => "fontColorNeutralTertiary",
        _ => match shade {
            0 => "fontColorThemePrimary",
            1 | 2 => "fontColorThemeSecondary",
            3 => "fontColorThemeTertiary",
            4 => "fontColorThemeDarkAlt",
            _ => "fontColorThemeDarker",
        },
    }
}

fn theme_back_color(slot: u8) -> &'static str {
    match slot {
        1..=4 => "highlightColorGray",
        5 | 6 => "highlightColorBlue",
        7 | 8 => "highlightColorAqua",
        _ => "highlightColorMagenta",
    }
}

fn fore_color(index: u8) -> Option<&'static str> {
    Some(match index {
        1 => "fontColorRedDark",
        2 => "fontColorRed",
        3 => "fontColorOrangeLighter",
        4 => "fontColorYellow",
        5 => "fontColorLightGreen",
        6 => "fontColorGreen",
        7 => "fontColorLightBlue",
        8 => "fontColorBlue",
        9 => "fontColorDarkBlue",
        10 => "fontColorPurple",
        _ => return None,
    })
}

fn back_color(index: u8) -> Option<&'static str> {
    Some(match index {
        1 => "highlightColorDarkRed",
        2 => "highlightColorRed",
        3 => "highlightColorDarkYellow",
        4 => "highlightColorYellow",
        5 => "highlightColorGreen",
        6 => "highlightColorDarkGreen",
        7 => "highlightColorAqua",
        8 => "highlightColorBlue",
        9 => "highlightColorDarkBlue",
        10 => "highlightColorMagenta",
        _ => return None,
    })
}

fn font_size(index: u8) -> Option<&'static str> {
    Some(match index {
        1 => "fontSizeSmall",
        2 => "fontSizeMedium",
        3 => "fontSizeMediumPlus",
        4 => "fontSizeXLarge",
        5 => "fontSizeXxLarge",
        6 => "fontSizeSuper",
        7 => "fontSizeMega",
        _ => return None,
    })
}

fn style_preset(name: &str) -> Option<&'static str> {
    Some(match name {
        "Accent1" | "Emphasis" => "fontColorThemePrimary",
        "Accent2" => "fontColorThemeSecondary",
        "IntenseQuote" => "fontColorThemeDarkAlt",
        "IntenseReferences" => "fontColorThemeDarker",
        "Quote" => "fontColorNeutralSecondary",
        "References" | "Byline" | "Caption" => "fontSizeSmall",
        "Tagline" => "fontSizeLarge",
        "Highlight" => "highlightColorYellow",
        _ => return None,
    })
}

/// Rewrites a class attribute value: `ms-rte*` classes go through the lookup
/// tables, every other class is kept as is.
pub fn rewrite_class_list(classes: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for class in classes.split_whitespace() {
        let mapped = if class.starts_with("ms-rte") {
            map_rte_class(class)
        } else {
            Some(class)
        };
        if let Some(mapped) = mapped {
            if !out.contains(&mapped) {
                out.push(mapped);
            }
        }
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_classes_and_drops_the_rest() {
        assert_eq!(map_rte_class("ms-rteForeColor-2"), Some("fontColorRed"));
        assert_eq!(map_rte_class("ms-rteFontSize-3"), Some("fontSizeMediumPlus"));
        assert_eq!(
            map_rte_class("ms-rteThemeForeColor-5-0"),
            Some("fontColorThemePrimary")
        );
        assert_eq!(map_rte_class("ms-rteFontFace-1"), None);
        assert_eq!(map_rte_class("ms-rteForeColor-99"), None);
    }

    #[test]
    fn rewrite_keeps_foreign_classes() {
        assert_eq!(
            rewrite_class_list("custom ms-rteBackColor-4 ms-rteFontFace-2"),
            "custom highlightColorYellow"
        );
    }
}
