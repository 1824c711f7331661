use pagemark_core::error::PagemarkError;
use std::path::Path;

pub fn validate(file: &Path) -> Result<(), PagemarkError> {
    let config = pagemark_core::config::load_config(file)?;

    println!("Configuration {} is valid.", file.display());
    println!(
        "  Labels: {}",
        config
            .labels
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !config.relations.is_empty() {
        println!(
            "  Relations: {}",
            config
                .relations
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    let margins = &config.preannotation;
    println!(
        "  Search margin: {}/{}/{}/{} (left/top/right/bottom)",
        margins.search_margin.left,
        margins.search_margin.top,
        margins.search_margin.right,
        margins.search_margin.bottom
    );
    println!(
        "  Rectify margin: {}/{}/{}/{} (left/top/right/bottom)",
        margins.rectify_margin.left,
        margins.rectify_margin.top,
        margins.rectify_margin.right,
        margins.rectify_margin.bottom
    );

    Ok(())
}
