use multipost_core::model::{Listing, Price};
use multipost_core::variation::VariationEngine;

fn sample_listing(row: u32) -> Listing {
    Listing {
        row,
        name: "Samsung Galaxy A52".into(),
        price: Price {
            amount: Some(250.0),
            currency: "USD".into(),
        },
        description: "Telefono en excelente estado, poco uso, precio negociable.".into(),
        image_url: None,
        category: "Celulares".into(),
        location: "La Habana".into(),
        contact: "+53 5555 1234".into(),
        whatsapp_link: None,
        published: false,
        published_at: None,
    }
}

#[test]
fn variations_are_never_empty() {
    let mut engine = VariationEngine::with_seed(7);
    for row in 0..50 {
        let variation = engine.generate(&sample_listing(row));
        assert!(!variation.title.trim().is_empty());
        assert!(!variation.description.trim().is_empty());
        assert!(!variation.fallback);
    }
}

#[test]
fn variation_keeps_listing_name() {
    let mut engine = VariationEngine::with_seed(11);
    let variation = engine.generate(&sample_listing(1));
    assert!(variation.title.contains("Samsung Galaxy A52"));
}

#[test]
fn consecutive_variations_for_same_listing_differ() {
    let mut engine = VariationEngine::with_seed(3);
    let listing = sample_listing(9);
    for _ in 0..25 {
        let first = engine.generate(&listing);
        let second = engine.generate(&listing);
        assert!(
            (first.title, first.description) != (second.title, second.description),
            "two consecutive variations must not be byte-identical"
        );
    }
}

#[test]
fn description_varies_across_calls() {
    let mut engine = VariationEngine::with_seed(21);
    let listing = sample_listing(2);
    let outputs: Vec<String> = (0..10)
        .map(|_| engine.generate(&listing).description)
        .collect();
    let distinct: std::collections::HashSet<&String> = outputs.iter().collect();
    assert!(
        distinct.len() > 1,
        "description composition should not be constant"
    );
}

#[test]
fn missing_price_still_produces_a_title() {
    let mut engine = VariationEngine::with_seed(5);
    let mut listing = sample_listing(3);
    listing.price.amount = None;
    let variation = engine.generate(&listing);
    assert!(variation.title.contains("Precio a consultar") || !variation.title.is_empty());
    assert!(!variation.fallback);
}

#[test]
fn empty_description_falls_back_to_name_text() {
    let mut engine = VariationEngine::with_seed(13);
    let mut listing = sample_listing(4);
    listing.description = String::new();
    let variation = engine.generate(&listing);
    assert!(!variation.description.trim().is_empty());
}

#[test]
fn recency_map_stays_bounded() {
    let mut engine = VariationEngine::with_seed(17);
    for row in 0..2500 {
        engine.generate(&sample_listing(row));
    }
    assert!(engine.recency_entries() <= 1000);
}
