//! Built-in starter content, inserted once when the content family is empty.

use crate::models::{Category, ContentItem, Difficulty, LocalizedOptions, LocalizedText};

fn text(en: &str, hi: &str, or: &str) -> LocalizedText {
    LocalizedText {
        en: en.to_string(),
        hi: hi.to_string(),
        or: or.to_string(),
    }
}

fn options(en: &[&str], hi: &[&str], or: &[&str]) -> LocalizedOptions {
    let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
    LocalizedOptions {
        en: owned(en),
        hi: owned(hi),
        or: owned(or),
    }
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// The starter STEM question set.
pub fn default_content() -> Vec<ContentItem> {
    let numbers = ["40", "42", "43", "45"];
    vec![
        ContentItem {
            id: "math_001".to_string(),
            category: Category::Math,
            difficulty: Difficulty::Easy,
            prompt: text(
                "What is 15 + 27?",
                "15 + 27 का योग क्या है?",
                "15 + 27 ର ଯୋଗଫଳ କେତେ?",
            ),
            options: options(&numbers, &numbers, &numbers),
            correct_option: 1,
            explanation: Some(text(
                "15 + 27 = 42. Add the numbers step by step: 15 + 20 = 35, then 35 + 7 = 42.",
                "15 + 27 = 42। संख्याओं को चरणबद्ध तरीके से जोड़ें: 15 + 20 = 35, फिर 35 + 7 = 42।",
                "15 + 27 = 42। ସଂଖ୍ୟାଗୁଡ଼ିକୁ ଧାପେ ଧାପେ ଯୋଗ କରନ୍ତୁ: 15 + 20 = 35, ତାପରେ 35 + 7 = 42।",
            )),
            tags: tags(&["addition", "basic-math"]),
        },
        ContentItem {
            id: "science_001".to_string(),
            category: Category::Science,
            difficulty: Difficulty::Easy,
            prompt: text(
                "Which part of the plant absorbs water?",
                "पौधे का कौन सा भाग पानी सोखता है?",
                "ଉଦ୍ଭିଦର କେଉଁ ଅଂଶ ପାଣି ଶୋଷିତ କରେ?",
            ),
            options: options(
                &["Leaves", "Roots", "Flowers", "Stem"],
                &["पत्ते", "जड़ें", "फूल", "तना"],
                &["ପତ୍ର", "ମୂଳ", "ଫୁଲ", "କାଣ୍ଡ"],
            ),
            correct_option: 1,
            explanation: Some(text(
                "Roots absorb water and nutrients from the soil to feed the plant.",
                "जड़ें मिट्टी से पानी और पोषक तत्वों को सोखती हैं और पौधे को भोजन प्रदान करती हैं।",
                "ମୂଳ ମାଟିରୁ ପାଣି ଏବଂ ପୋଷକ ତତ୍ତ୍ୱ ଶୋଷିତ କରି ଉଦ୍ଭିଦକୁ ଖାଦ୍ୟ ଯୋଗାଇଥାଏ।",
            )),
            tags: tags(&["plants", "biology", "nature"]),
        },
        ContentItem {
            id: "technology_001".to_string(),
            category: Category::Technology,
            difficulty: Difficulty::Easy,
            prompt: text(
                "Which device is used to type text into a computer?",
                "कंप्यूटर में टेक्स्ट टाइप करने के लिए किस उपकरण का उपयोग होता है?",
                "କମ୍ପ୍ୟୁଟରରେ ଲେଖା ଟାଇପ୍ କରିବା ପାଇଁ କେଉଁ ଉପକରଣ ବ୍ୟବହୃତ ହୁଏ?",
            ),
            options: options(
                &["Monitor", "Speaker", "Keyboard", "Printer"],
                &["मॉनिटर", "स्पीकर", "कीबोर्ड", "प्रिंटर"],
                &["ମନିଟର", "ସ୍ପିକର", "କୀବୋର୍ଡ", "ପ୍ରିଣ୍ଟର"],
            ),
            correct_option: 2,
            explanation: None,
            tags: tags(&["computers", "input-devices"]),
        },
        ContentItem {
            id: "engineering_001".to_string(),
            category: Category::Engineering,
            difficulty: Difficulty::Medium,
            prompt: text(
                "Which simple machine is a ramp?",
                "रैंप कौन सी सरल मशीन है?",
                "ରାମ୍ପ କେଉଁ ସରଳ ଯନ୍ତ୍ର?",
            ),
            options: options(
                &["Lever", "Pulley", "Inclined plane", "Wheel"],
                &["उत्तोलक", "घिरनी", "आनत तल", "पहिया"],
                &["ଲିଭର", "କପିକଳ", "ଆନତ ସମତଳ", "ଚକ"],
            ),
            correct_option: 2,
            explanation: Some(text(
                "A ramp is an inclined plane: it trades a longer distance for less force.",
                "रैंप एक आनत तल है: यह कम बल के बदले लंबी दूरी तय कराता है।",
                "ରାମ୍ପ ଏକ ଆନତ ସମତଳ: ଏହା କମ୍ ବଳ ବଦଳରେ ଅଧିକ ଦୂରତା ନିଏ।",
            )),
            tags: tags(&["simple-machines", "physics"]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_content_is_valid() {
        let items = default_content();
        assert_eq!(items.len(), 4);
        for item in &items {
            item.validate().unwrap();
        }
        for category in Category::ALL {
            assert!(items.iter().any(|i| i.category == category));
        }
    }
}
