use multipost_core::orchestrator::ListingSource;
use multipost_core::VariationEngine;

use crate::sources::JsonListingSource;
use crate::{PreviewArgs, Result};

/// Prints candidate rewrites so a batch can be sanity-checked before a
/// run touches the site.
pub async fn execute(args: PreviewArgs) -> Result<()> {
    let source = JsonListingSource::load(&args.listings)?;
    let mut engine = match args.seed {
        Some(seed) => VariationEngine::with_seed(seed),
        None => VariationEngine::new(),
    };

    let listings = source.pending_listings().await?;
    let selected: Vec<_> = listings
        .into_iter()
        .filter(|listing| args.row.map(|row| listing.row == row).unwrap_or(true))
        .collect();

    if selected.is_empty() {
        println!("no pending listings matched");
        return Ok(());
    }

    for listing in &selected {
        println!("== row {} · {}", listing.row, listing.name);
        for n in 1..=args.count.max(1) {
            let variation = engine.generate(listing);
            println!("-- variation {n}");
            println!("title: {}", variation.title);
            println!("description: {}", variation.description);
        }
        println!();
    }
    Ok(())
}
