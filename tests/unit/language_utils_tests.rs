/*!
 * Tests for language tag utilities
 */

use bookwai::language_utils::{language_display_name, validate_language_tag};

#[test]
fn test_validate_language_tag_should_accept_common_targets() {
    for tag in ["zh-TW", "zh-Hant", "ja", "fr", "de", "es-419", "pt_BR", "ko"] {
        assert!(validate_language_tag(tag).is_ok(), "{} should be valid", tag);
    }
}

#[test]
fn test_language_display_name_should_read_naturally() {
    assert_eq!(language_display_name("ja").unwrap(), "Japanese");
    assert_eq!(language_display_name("pt-BR").unwrap(), "Portuguese (BR)");
    assert!(language_display_name("zz").is_err());
}
