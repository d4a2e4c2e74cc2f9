// src/utils/html.rs

use ammonia;

/// Strips unsafe markup from teacher-authored text using the ammonia whitelist.
///
/// Safe formatting tags (like <b>, <sub>) survive, script tags and event
/// attributes are removed together with their content. Question text and
/// options are rendered as HTML in the exam view, so everything authored goes
/// through here before it is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Cleans a list of answer options in place.
pub fn clean_all(inputs: &mut [String]) {
    for input in inputs.iter_mut() {
        *input = clean_html(input);
    }
}
