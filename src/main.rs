use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::time::Instant;
use svm_ablate::{
    max_feature_index, parse_arguments, project_file, run_ablation, CliSettings, LibsvmToolchain,
};

fn project_only(settings: &CliSettings, output: &Path, max_index: usize) -> Result<()> {
    let removed = settings.plan(max_index).initial_removed;
    let stats = project_file(
        &settings.dataset,
        output,
        &removed,
        settings.config.malformed_policy,
    )
    .with_context(|| format!("projecting {}", settings.dataset.display()))?;

    println!(
        "Wrote {} records to {} ({} pairs kept, {} dropped)",
        stats.records,
        output.display(),
        stats.pairs_kept,
        stats.pairs_dropped
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start = Instant::now();

    let settings = match parse_arguments() {
        Ok(settings) => settings,
        Err(e) => e.exit(),
    };
    settings.config.validate()?;

    let max_index = max_feature_index(&settings.dataset, settings.config.malformed_policy)
        .with_context(|| format!("reading {}", settings.dataset.display()))?;
    info!(
        "{} uses feature columns up to {}",
        settings.dataset.display(),
        max_index
    );

    if let Some(output) = &settings.project_only {
        return project_only(&settings, output, max_index);
    }

    // The temporary directory is removed when `_temp_dir` drops at the end of main;
    // an explicit --work-dir keeps every measurement's files
    let (work_dir, _temp_dir) = match &settings.work_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let temp = tempfile::Builder::new()
                .prefix("svm-ablate")
                .tempdir()
                .context("creating temporary work directory")?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };
    info!("Writing intermediate files to {}", work_dir.display());

    let mut toolchain = LibsvmToolchain::new(&settings.config);
    let plan = settings.plan(max_index);

    println!(
        "\nRunning feature ablation on {}, rounds: {}, trials per measurement: {}",
        settings.dataset.display(),
        settings.config.rounds,
        settings.config.trials
    );

    let report = run_ablation(
        &mut toolchain,
        &settings.dataset,
        &plan,
        &settings.config,
        &work_dir,
    )
    .with_context(|| format!("ablation of {} failed", settings.dataset.display()))?;

    print!("{}", report);
    println!("\nTotal runtime: {:.2?}", start.elapsed());
    Ok(())
}
