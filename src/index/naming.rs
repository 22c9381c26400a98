use crate::metadata::ModelInfo;
use deunicode::deunicode_with_tofu;

/// Turns a display name into a token-safe name component.
///
/// Spaces, dots and hyphens become underscores and the result is lowercased,
/// then transliterated to ASCII. Transliteration may introduce spaces and
/// capitals (`"北京"` reads `"Bei Jing"`), so the output is folded once more
/// to lowercase alphanumerics and underscores.
pub fn sanitize(name: &str) -> String {
    let replaced = name.replace([' ', '.', '-'], "_").to_lowercase();

    deunicode_with_tofu(&replaced, "")
        .chars()
        .filter_map(|c| match c {
            ' ' | '.' | '-' | '_' => Some('_'),
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}

/// Derives the index name from its backend, model and language.
///
/// Returns `None` unless all three are present and the backend name is not
/// empty. The language code is appended as is.
pub fn compute_name(
    backend_name: Option<&str>,
    model: Option<&ModelInfo>,
    lang_code: Option<&str>,
) -> Option<String> {
    let backend_name = backend_name.filter(|n| !n.is_empty())?;
    let model = model?;
    let lang_code = lang_code?;

    Some(format!(
        "{}_{}_{}",
        sanitize(backend_name),
        sanitize(model.name.as_deref().unwrap_or("")),
        lang_code
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: Option<&str>) -> ModelInfo {
        ModelInfo {
            id: 1,
            model: "product.template".to_string(),
            name: name.map(str::to_string),
            indexable: true,
            transient: false,
        }
    }

    #[test]
    fn test_sanitize_replaces_separators_and_lowercases() {
        assert_eq!(sanitize("My Shop"), "my_shop");
        assert_eq!(sanitize("product.template"), "product_template");
        assert_eq!(sanitize("Point-of-Sale"), "point_of_sale");
    }

    #[test]
    fn test_sanitize_strips_diacritics() {
        assert_eq!(sanitize("Café Crème"), "cafe_creme");
        assert_eq!(sanitize("Ångström"), "angstrom");
    }

    #[test]
    fn test_sanitize_transliterates_letters_without_decomposition() {
        assert_eq!(sanitize("Øresund"), "oresund");
        assert_eq!(sanitize("Straße"), "strasse");
        assert_eq!(sanitize("Ærø Shop"), "aero_shop");
    }

    #[test]
    fn test_sanitize_transliterates_cjk() {
        let product = sanitize("商品");
        let customer = sanitize("顧客");

        assert!(!product.is_empty());
        assert!(!customer.is_empty());
        assert_ne!(product, customer);
        for component in [&product, &customer] {
            assert!(component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[test]
    fn test_cjk_model_names_derive_distinct_index_names() {
        let product = compute_name(Some("Shop"), Some(&model(Some("商品"))), Some("ja_JP"));
        let customer = compute_name(Some("Shop"), Some(&model(Some("顧客"))), Some("ja_JP"));
        assert_ne!(product, customer);
    }

    #[test]
    fn test_compute_name() {
        let name = compute_name(
            Some("My Shop"),
            Some(&model(Some("Product Template"))),
            Some("en_US"),
        );
        assert_eq!(name.as_deref(), Some("my_shop_product_template_en_US"));
    }

    #[test]
    fn test_compute_name_missing_inputs() {
        let m = model(Some("Product"));
        assert_eq!(compute_name(None, Some(&m), Some("en_US")), None);
        assert_eq!(compute_name(Some(""), Some(&m), Some("en_US")), None);
        assert_eq!(compute_name(Some("Shop"), None, Some("en_US")), None);
        assert_eq!(compute_name(Some("Shop"), Some(&m), None), None);
    }

    #[test]
    fn test_compute_name_unnamed_model_contributes_empty_component() {
        let name = compute_name(Some("Shop"), Some(&model(None)), Some("fr_FR"));
        assert_eq!(name.as_deref(), Some("shop__fr_FR"));
    }
}
