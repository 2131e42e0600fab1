use std::sync::Arc;

use assert_json_diff::assert_json_include;
use listing_normalizer::display::display_registry;
use listing_normalizer::{
    Admission, DeduplicationPolicy, IdentityKey, MaterializedView, Outcome, Pipeline, ViewSource,
    Vocabulary,
};
use serde_json::{json, Value};

const ACER: &str = r#"{"URL":"https://www.newegg.ca/Product/Product.aspx?Item=N82E16824014378","Brand":"Acer","ModelNumber":"PH-55621","ScreenSize":"22in","Resolution":"1920 x 1080","ResponseTime":"5ms","RefreshRate":"60 hertz"}"#;

fn display_pipeline() -> (Arc<MaterializedView>, Pipeline) {
    let vocabulary = Vocabulary::display_default().unwrap();
    let feedback = Arc::new(MaterializedView::new());
    let recovery = Arc::new(MaterializedView::new());
    let pipeline = Pipeline::new(
        display_registry(&vocabulary),
        DeduplicationPolicy::new(feedback.clone(), recovery),
    );
    (feedback, pipeline)
}

#[test]
fn acer_listing_is_accepted_and_normalized() {
    let (_, pipeline) = display_pipeline();

    let Outcome::Accepted { key, record } = pipeline.run(ACER.as_bytes()) else {
        panic!("acer listing was not accepted");
    };

    assert_eq!(key.as_str(), "916972655fc2d994c5837b8479f13f08");
    assert_json_include!(
        actual: Value::Object(record),
        expected: json!({
            "URL": "https://www.newegg.ca/Product/Product.aspx?Item=N82E16824014378",
            "Brand": "Acer",
            "ModelNumber": "PH-55621",
            "ScreenSize": "22",
            "Resolution": "1920x1080",
            "ResponseTime": "5",
            "RefreshRate": "60",
            "Ergonomics": {},
            "Connectivity": {}
        })
    );
}

#[test]
fn second_sighting_of_a_url_is_dropped() {
    let (feedback, pipeline) = display_pipeline();
    let first = json!({
        "Category": "Monitor",
        "URL": "https://www.newegg.ca/Product/Product.aspx?Item=N82E16824014378",
        "Brand": "Acer",
        "ModelNumber": "PH-55621",
        "FoundTime": "1542152800",
        "ScreenSize": "22in",
        "Resolution": "1920 x 1080",
        "Connectors": "2 x HDMI, 1 x DisplayPort"
    })
    .to_string();
    let mut second: Value = serde_json::from_str(&first).unwrap();
    second["Price"] = json!("$89.99");
    let second = second.to_string();

    let Admission::Rekey { key } = pipeline.admit(first.as_bytes()) else {
        panic!("first listing was not admitted");
    };

    let Outcome::Accepted { key: accepted, record } = pipeline.process(first.as_bytes()) else {
        panic!("first listing was not accepted");
    };
    assert_eq!(accepted, key);
    assert_json_include!(
        actual: Value::Object(record),
        expected: json!({
            "Brand": "Acer",
            "ScreenSize": "22",
            "Resolution": "1920x1080",
            "Connectivity": {"HDMI": "2", "DisplayPort": "1"},
            "Ergonomics": {}
        })
    );

    // what the feedback topic delivers back once the listing reached the success sink
    feedback.upsert(key.clone(), "");

    assert_eq!(
        pipeline.run(second.as_bytes()),
        Outcome::Duplicate {
            key: IdentityKey::from_url(
                "https://www.newegg.ca/Product/Product.aspx?Item=N82E16824014378"
            ),
            source: ViewSource::Feedback,
        }
    );
}
