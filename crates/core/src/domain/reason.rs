//! Machine-readable reason codes and the messages clients show for them.
//!
//! Rejected cup readings and internal errors carry [`user_message`] for their code in the
//! HTTP body.

pub const OK: &str = "ok";
pub const IMAGE_TOO_SMALL: &str = "image_too_small";
pub const IMAGE_TOO_SMALL_DIMENSIONS: &str = "image_too_small_dimensions";
pub const TOO_DARK: &str = "too_dark";
pub const BAD_ASPECT_RATIO: &str = "bad_aspect_ratio";
pub const LOW_CONTRAST: &str = "low_contrast";
pub const VALIDATION_ERROR: &str = "validation_error";
pub const ANALYSIS_FAILED: &str = "analysis_failed";
pub const NSFW_DETECTED: &str = "nsfw_detected";
pub const NOT_A_CUP: &str = "not_a_cup";

const GENERIC_MESSAGE: &str = "Nešto nije u redu sa fotografijom. Pokušaj ponovo sa jasnom slikom šoljice.";

/// Codes a rejected reading may carry. `ok` and `analysis_failed` are not among them.
pub fn is_rejection(code: &str) -> bool {
    matches!(
        code,
        IMAGE_TOO_SMALL
            | IMAGE_TOO_SMALL_DIMENSIONS
            | TOO_DARK
            | BAD_ASPECT_RATIO
            | LOW_CONTRAST
            | VALIDATION_ERROR
            | NSFW_DETECTED
            | NOT_A_CUP
    )
}

pub fn user_message(code: &str) -> &'static str {
    match code {
        OK => "Tvoje čitanje je spremno.",
        IMAGE_TOO_SMALL => "Slika je premala. Fotografiši šoljicu u punoj rezoluciji.",
        IMAGE_TOO_SMALL_DIMENSIONS => "Slika ima premalu rezoluciju. Priđi bliže i fotografiši ponovo.",
        TOO_DARK => "Slika je previše tamna. Upali svetlo ili priđi prozoru.",
        BAD_ASPECT_RATIO => "Šoljica nije dobro uokvirena. Postavi je na sredinu kadra.",
        LOW_CONTRAST => "Šare u talogu se ne vide jasno. Probaj pod jačim svetlom.",
        VALIDATION_ERROR => "Fotografiju nije moguće otvoriti. Pošalji JPEG, PNG ili WebP sliku.",
        ANALYSIS_FAILED => "Tumačenje trenutno nije uspelo. Pokušaj ponovo za nekoliko trenutaka.",
        NSFW_DETECTED => "Fotografija sadrži neprikladan sadržaj. Pošalji sliku šoljice.",
        NOT_A_CUP => "Na slici ne vidimo šoljicu. Fotografiši unutrašnjost šoljice sa talogom.",
        _ => GENERIC_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_known_code_has_a_distinct_message() {
        let codes = [
            IMAGE_TOO_SMALL,
            IMAGE_TOO_SMALL_DIMENSIONS,
            TOO_DARK,
            BAD_ASPECT_RATIO,
            LOW_CONTRAST,
            VALIDATION_ERROR,
            ANALYSIS_FAILED,
            NSFW_DETECTED,
            NOT_A_CUP,
        ];
        let messages: HashSet<_> = codes.iter().map(|c| user_message(c)).collect();
        assert_eq!(messages.len(), codes.len());
        assert!(!messages.contains(GENERIC_MESSAGE));
    }

    #[test]
    fn only_rejection_codes_qualify() {
        assert!(is_rejection(NOT_A_CUP));
        assert!(is_rejection(TOO_DARK));
        assert!(!is_rejection(OK));
        assert!(!is_rejection(ANALYSIS_FAILED));
        assert!(!is_rejection("looks fine to me"));
    }

    #[test]
    fn unknown_codes_fall_back_to_generic_message() {
        assert_eq!(user_message("something_new"), GENERIC_MESSAGE);
        assert_eq!(user_message(""), GENERIC_MESSAGE);
    }
}
