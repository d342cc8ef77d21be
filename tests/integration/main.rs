//! Integration tests for cacheprog

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary isolated from the user's config and environment
    fn cacheprog(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cacheprog");
        cmd.env("CACHEPROG_CONFIG", home.path().join("config.toml"))
            .env_remove("CACHEPROG_BACKEND")
            .env_remove("CACHEPROG_CACHE_DIR")
            .env_remove("CACHEPROG_S3_BUCKET")
            .env_remove("CACHEPROG_DEBUG")
            .env_remove("CACHEPROG_STATS")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        cacheprog(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("remote-backed build cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        cacheprog(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cacheprog"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        cacheprog(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_reflects_flags() {
        let home = TempDir::new().unwrap();
        cacheprog(&home)
            .args(["config", "show", "--backend", "s3", "--s3-bucket", "builds"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("backend = \"s3\""))
            .stdout(predicate::str::contains("bucket = \"builds\""));
    }

    #[test]
    fn config_file_is_read() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "[s3]\nprefix = \"from-file\"\n",
        )
        .unwrap();
        cacheprog(&home)
            .args(["config"])
            .assert()
            .success()
            .stdout(predicate::str::contains("prefix = \"from-file\""));
    }

    #[test]
    fn invalid_config_file_fails() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.toml"), "[cache\n").unwrap();
        cacheprog(&home)
            .args(["config"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn s3_backend_without_bucket_fails() {
        let home = TempDir::new().unwrap();
        cacheprog(&home)
            .args(["--backend", "s3"])
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("bucket"))
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn unknown_subcommand_fails() {
        let home = TempDir::new().unwrap();
        cacheprog(&home).arg("frobnicate").assert().failure();
    }

    #[test]
    fn clear_with_yes() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        cacheprog(&home)
            .args(["clear", "--yes", "--cache-dir"])
            .arg(cache.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared"));
    }

    #[test]
    fn clear_declined_keeps_entries() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        cacheprog(&home)
            .args(["clear", "--cache-dir"])
            .arg(cache.path())
            .write_stdin("n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted."));
    }
}

mod protocol_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serde_json::Value;
    use tempfile::TempDir;

    const ZERO_ACTION: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    fn serve(home: &TempDir, cache: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cacheprog");
        cmd.env("CACHEPROG_CONFIG", home.path().join("config.toml"))
            .env_remove("CACHEPROG_BACKEND")
            .env_remove("CACHEPROG_DEBUG")
            .env_remove("CACHEPROG_STATS")
            .env_remove("RUST_LOG")
            .arg("--cache-dir")
            .arg(cache.path());
        cmd
    }

    fn responses(stdout: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(stdout)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn get_put_close_session() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let input = format!(
            "{{\"ID\":1,\"Command\":\"get\",\"ActionID\":\"{a}\"}}\n\
             {{\"ID\":2,\"Command\":\"put\",\"ActionID\":\"{a}\",\"OutputID\":\"AQ==\",\"BodySize\":4}}\n\
             \"dGVzdA==\"\n\
             {{\"ID\":3,\"Command\":\"close\"}}\n",
            a = ZERO_ACTION
        );

        let output = serve(&home, &cache)
            .write_stdin(input)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let lines: Vec<String> = String::from_utf8(output.clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines[0], r#"{"ID":0,"KnownCommands":["put","get","close"]}"#);
        assert_eq!(lines[1], r#"{"ID":1,"Miss":true}"#);

        let parsed = responses(&output);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[2]["ID"], 2);
        let disk_path = parsed[2]["DiskPath"].as_str().unwrap();
        assert_eq!(std::fs::read(disk_path).unwrap(), b"test");
        assert_eq!(lines[3], r#"{"ID":3}"#);
    }

    #[test]
    fn entries_survive_across_sessions() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let put = format!(
            "{{\"ID\":1,\"Command\":\"put\",\"ActionID\":\"{a}\",\"OutputID\":\"AQI=\",\"BodySize\":4}}\n\"dGVzdA==\"\n",
            a = ZERO_ACTION
        );
        serve(&home, &cache).write_stdin(put).assert().success();

        let get = format!(
            "{{\"ID\":5,\"Command\":\"get\",\"ActionID\":\"{a}\"}}\n",
            a = ZERO_ACTION
        );
        let output = serve(&home, &cache)
            .write_stdin(get)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let parsed = responses(&output);
        let hit = &parsed[1];
        assert_eq!(hit["ID"], 5);
        assert!(hit.get("Miss").is_none());
        assert_eq!(hit["OutputID"], "AQI=");
        assert_eq!(hit["Size"], 4);
        assert!(hit["Time"].is_string());
    }

    #[test]
    fn malformed_request_fails_session() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        serve(&home, &cache)
            .write_stdin("this is not json\n")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Malformed request"));
    }

    #[test]
    fn stats_printed_to_stderr() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let get = format!(
            "{{\"ID\":1,\"Command\":\"get\",\"ActionID\":\"{a}\"}}\n",
            a = ZERO_ACTION
        );
        serve(&home, &cache)
            .arg("--stats")
            .write_stdin(get)
            .assert()
            .success()
            .stderr(predicate::str::contains("get_overall (n=1)"));
    }

    #[test]
    fn debug_logs_stay_off_stdout() {
        let home = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let get = format!(
            "{{\"ID\":1,\"Command\":\"get\",\"ActionID\":\"{a}\"}}\n",
            a = ZERO_ACTION
        );
        let output = serve(&home, &cache)
            .args(["--debug", "-vv"])
            .write_stdin(get)
            .assert()
            .success()
            .stderr(predicate::str::contains("get miss"))
            .get_output()
            .stdout
            .clone();

        // Every stdout line is a protocol response.
        assert_eq!(responses(&output).len(), 2);
    }
}
