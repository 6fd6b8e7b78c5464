#[cfg(test)]
pub mod tests {
    use std::process::Command;

    fn run_example(name: &str) -> (String, String) {
        let output = Command::new("cargo")
            .args(["run", "--example", name])
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        (
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    fn assert_contains(output: &str, expected: &[&str]) {
        for expected in expected {
            assert!(
                output.contains(expected),
                "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{output}",
            );
        }
    }

    #[test]
    fn test_track_new_output() {
        let (_stdout, stderr) = run_example("track_new");

        assert_contains(
            &stderr,
            &[
                "alloc (26 bytes, default-aligned)",
                "alloc (35 bytes, default-aligned)",
                "alloc aligned (64 bytes, 64-byte aligned)",
                "allocations for",
            ],
        );
    }

    #[test]
    fn test_measure_output() {
        let (stdout, stderr) = run_example("measure");

        assert_contains(&stdout, &["built 10 names, total 6"]);
        assert_contains(
            &stderr,
            &[
                "measure::build_names: ",
                "measure::no_allocations: 0 allocations for 0 bytes",
            ],
        );
    }

    #[test]
    fn test_arena_output() {
        let (stdout, stderr) = run_example("arena");

        assert_contains(
            &stdout,
            &["-- check with 1000 elements:", "-- check with 50000 elements:"],
        );
        let statuses: Vec<&str> = stderr
            .lines()
            .filter(|line| line.contains(" allocations for "))
            .collect();
        assert_eq!(statuses.len(), 7, "Got:\n{stderr}");
        assert_eq!(statuses[0], "0 allocations for 0 bytes");
        assert_ne!(statuses[5], "0 allocations for 0 bytes");
    }

    #[test]
    fn test_pool_tracker_output() {
        let (stdout, _stderr) = run_example("pool_tracker");

        assert_contains(
            &stdout,
            &[
                "keeppool:allocate ",
                "  syncpool:allocate ",
                "  syncpool:deallocate ",
                "keeppool:deallocate ",
                "--- third iteration done",
                "--- leave scope of pool",
                "--- leave scope of keeppool",
                "Peak",
                "P99",
            ],
        );

        // chunks only go back upstream when their owner goes away
        let pool_left = stdout.find("--- leave scope of pool").unwrap();
        let keeppool_left = stdout.find("--- leave scope of keeppool").unwrap();
        assert!(stdout.find("  syncpool:deallocate").unwrap() > pool_left);
        assert!(stdout.find("keeppool:deallocate").unwrap() > keeppool_left);
    }

    #[test]
    fn test_null_resource_output() {
        let (stdout, stderr) = run_example("null_resource");

        assert_contains(&stderr, &["allocation failed:", "exhausted the resource"]);
        let size: usize = stdout
            .trim()
            .strip_prefix("size: ")
            .and_then(|n| n.parse().ok())
            .expect("size line");
        assert!(size > 0);
    }

    #[test]
    fn test_cli_json_summary() {
        let output = Command::new("cargo")
            .args([
                "run", "--bin", "memtrack", "--", "--format", "json", "vec", "--count", "10",
            ])
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
        assert_eq!(summary["caller_name"], "memtrack::vec");
        assert!(summary["global"]["allocations"].as_u64().unwrap() >= 10);
    }
}
