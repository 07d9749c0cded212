use sa_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("cc-slack doctor");
    println!("===============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_database(config, &mut all_passed).await;
    check_agent_executable(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_database(config: &Config, all_passed: &mut bool) {
    let path = config.database.path.clone();
    let opened = tokio::task::spawn_blocking(move || sa_store::Store::open(&path).is_ok())
        .await
        .unwrap_or(false);

    print_check(
        "Database opens",
        opened,
        if opened {
            config.database.path.display().to_string()
        } else {
            format!("{} (failed to open)", config.database.path.display())
        },
    );

    if !opened {
        *all_passed = false;
    }
}

fn check_agent_executable(config: &Config, all_passed: &mut bool) {
    let found = which_on_path(&config.claude.executable).is_some();
    print_check(
        "Agent executable on PATH",
        found,
        config.claude.executable.clone(),
    );
    if !found {
        *all_passed = false;
    }
}

fn which_on_path(executable: &str) -> Option<std::path::PathBuf> {
    if std::path::Path::new(executable).is_absolute() {
        return std::path::Path::new(executable).exists().then(|| executable.into());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(executable))
            .find(|candidate| candidate.is_file())
    })
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
