//! Tarantupedia reference URLs
//!
//! Each predicted label is paired with a link into the Tarantupedia species
//! index. The URL is derived from the label: lower-cased genus as one path
//! segment, then `genus-species` joined with hyphens. Labels offering
//! multiple alternatives ("x or y") link to the genus page only, since a
//! species-level URL would be ambiguous.

const BASE_URL: &str = "https://www.tarantupedia.com/theraphosinae";

/// Build the Tarantupedia URL for a species label.
///
/// Accepts both display form ("Poecilotheria metallica") and catalog form
/// ("poecilotheria_metallica").
pub fn tarantupedia_link(label: &str) -> String {
    let name = label.trim().replace('_', " ").to_lowercase();
    let tokens: Vec<&str> = name.split_whitespace().collect();

    match tokens.split_first() {
        None => BASE_URL.to_string(),
        Some((genus, [])) => format!("{}/{}", BASE_URL, genus),
        // Multi-alternative label: genus page only
        Some((genus, _)) if tokens.contains(&"or") => format!("{}/{}", BASE_URL, genus),
        Some((genus, species)) => {
            format!("{}/{}/{}-{}", BASE_URL, genus, genus, species.join("-"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genus_and_species() {
        assert_eq!(
            tarantupedia_link("Poecilotheria metallica"),
            "https://www.tarantupedia.com/theraphosinae/poecilotheria/poecilotheria-metallica"
        );
    }

    #[test]
    fn test_genus_only() {
        assert_eq!(
            tarantupedia_link("Theraphosa"),
            "https://www.tarantupedia.com/theraphosinae/theraphosa"
        );
    }

    #[test]
    fn test_multi_alternative_label_links_to_genus() {
        assert_eq!(
            tarantupedia_link("Grammostola iheringi or actaeon"),
            "https://www.tarantupedia.com/theraphosinae/grammostola"
        );
    }

    #[test]
    fn test_catalog_form_with_underscores() {
        assert_eq!(
            tarantupedia_link("brachypelma_hamorii"),
            "https://www.tarantupedia.com/theraphosinae/brachypelma/brachypelma-hamorii"
        );
    }

    #[test]
    fn test_multi_word_species_epithet() {
        assert_eq!(
            tarantupedia_link("Aphonopelma sp diamondback"),
            "https://www.tarantupedia.com/theraphosinae/aphonopelma/aphonopelma-sp-diamondback"
        );
    }
}
