use grouper::{Mode, RunConfig, RuntimePipeline};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn config(mode: Mode, workers: usize, scratch: &Path) -> RunConfig {
    let mut config = RunConfig { mode, workers, ..RunConfig::default() };
    config.count.buckets = 1 << 10;
    config.count.shards = 16;
    config.count.arena_block = 8;
    config.scratch_dir = scratch.to_path_buf();
    config.poll_interval = Duration::from_millis(5);
    config.wait_limit = Duration::from_secs(30);
    config
}

fn run_one(mode: Mode, workers: usize, input: &[u8]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let out_path = dir.path().join("out/result.txt");
    fs::write(&in_path, input).unwrap();
    let mut pipeline = RuntimePipeline::new(config(mode, workers, &dir.path().join("scratch")));
    pipeline.add_job(&in_path, &out_path);
    pipeline.run().unwrap();
    fs::read(&out_path).unwrap()
}

#[test]
fn example_report_for_every_mode_and_worker_count() {
    let input = b"ab\ncd\nab\nef\ncd\nab\n";
    for mode in [Mode::Channels, Mode::Threads, Mode::Sharded] {
        for workers in [1, 2, 3, 4, 7, 16] {
            assert_eq!(run_one(mode, workers, input), b"3\nab 3\ncd 2\nef 1\n", "mode {} workers {}", mode, workers);
        }
    }
}

#[test]
fn split_inside_a_record_matches_single_worker() {
    // with 2 workers the candidate boundary lands inside the second "ab"
    let input = b"ab\ncd\nab\nef\ncd\nab\n";
    let single = run_one(Mode::Channels, 1, input);
    assert_eq!(run_one(Mode::Channels, 2, input), single);
    let odd = b"ab\ncd\nab\nef\ncd\n";
    assert_eq!(run_one(Mode::Channels, 2, odd), run_one(Mode::Threads, 1, odd));
}

#[test]
fn empty_input_writes_empty_report() {
    for mode in [Mode::Channels, Mode::Threads, Mode::Sharded] {
        assert_eq!(run_one(mode, 4, b""), b"0\n");
    }
}

#[test]
fn blank_lines_and_carriage_returns_are_keys_of_their_own() {
    let input = b"a\n\nb\n\na\r\na\n";
    for mode in [Mode::Channels, Mode::Threads, Mode::Sharded] {
        for workers in [1, 2, 3, 5] {
            assert_eq!(run_one(mode, workers, input), b"4\n 2\na 2\na\r 1\nb 1\n", "mode {} workers {}", mode, workers);
        }
    }
}

#[test]
fn overlong_keys_are_truncated_and_merged_with_their_prefix() {
    let long = "k".repeat(33 + 5);
    let prefix = "k".repeat(32);
    let input = format!("{}\n{}\nother\n", long, prefix);
    let report = run_one(Mode::Threads, 2, input.as_bytes());
    assert_eq!(report, format!("2\n{} 2\nother 1\n", prefix).into_bytes());
}

#[test]
fn single_rank_cluster_run_cleans_its_scratch_dir() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let out_path = dir.path().join("result.txt");
    let scratch = dir.path().join("scratch");
    fs::write(&in_path, b"x\ny\nx\n").unwrap();
    let mut pipeline = RuntimePipeline::new(config(Mode::Cluster, 1, &scratch));
    pipeline.add_job(&in_path, &out_path);
    let stats = pipeline.run().unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), b"2\nx 2\ny 1\n");
    assert_eq!(stats.jobs[0].records, 3);
    assert!(stats.jobs[0].coordinator);
    let leftovers = fs::read_dir(&scratch).map(|d| d.flatten().flat_map(|e| fs::read_dir(e.path()).ok()).flatten().count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn failed_cluster_run_keeps_its_abort_marker() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("result.txt");
    let scratch = dir.path().join("scratch");
    let mut pipeline = RuntimePipeline::new(config(Mode::Cluster, 1, &scratch));
    pipeline.add_job(dir.path().join("nope.txt"), &out_path);
    assert!(pipeline.run().is_err());
    assert!(!out_path.exists());
    let markers: Vec<_> = fs::read_dir(&scratch)
        .unwrap()
        .flatten()
        .map(|job| job.path().join("job0").join("ABORT"))
        .filter(|p| p.exists())
        .collect();
    assert_eq!(markers.len(), 1);
    assert!(fs::read_to_string(&markers[0]).unwrap().contains("nope.txt"));
}

#[test]
fn runs_several_jobs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = RuntimePipeline::new(config(Mode::Sharded, 3, &dir.path().join("scratch")));
    for i in 0..3 {
        let input = dir.path().join(format!("in{}.txt", i));
        fs::write(&input, "a\n".repeat(i + 1)).unwrap();
        pipeline.add_job(&input, dir.path().join(format!("out{}.txt", i)));
    }
    let stats = pipeline.run().unwrap();
    assert_eq!(stats.jobs.len(), 3);
    for i in 0..3 {
        let report = fs::read_to_string(dir.path().join(format!("out{}.txt", i))).unwrap();
        assert_eq!(report, format!("1\na {}\n", i + 1));
        assert_eq!(stats.jobs[i].records, i as u64 + 1);
    }
    assert!(stats.to_json().unwrap().contains("\"mode\": \"sharded\""));
}

#[test]
fn missing_input_fails_without_writing_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("result.txt");
    let mut pipeline = RuntimePipeline::new(config(Mode::Channels, 2, &dir.path().join("scratch")));
    pipeline.add_job(dir.path().join("nope.txt"), &out_path);
    let err = pipeline.run().unwrap_err();
    assert!(format!("{:#}", err).contains("nope.txt"));
    assert!(!out_path.exists());
}

#[test]
fn invalid_config_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(Mode::Threads, 2, dir.path());
    cfg.count.buckets = 1000;
    let mut pipeline = RuntimePipeline::new(cfg);
    pipeline.add_job(dir.path().join("in.txt"), dir.path().join("out.txt"));
    let err = pipeline.run().unwrap_err();
    assert!(err.downcast_ref::<grouper::Error>().is_some());
}
