use apex_log_graph::application::{AnalyzeUsecase, View};
use apex_log_graph::config::{AppConfig, OutputFormat};
use apex_log_graph::infrastructure::{exporter_for, LogLoader};
use apex_log_graph::Error;
use std::fs;

const LOG: &str = "64.0 APEX_CODE,FINEST;DB,INFO;CALLOUT,INFO\n\
12:00:00.000 (0)|CODE_UNIT_STARTED|[EXTERNAL]|AccountTrigger on Account trigger event BeforeInsert\n\
12:00:00.001 (1000000)|METHOD_ENTRY|[1]|01p1|AccountHandler.beforeInsert(List<Account>)\n\
12:00:00.002 (2000000)|METHOD_ENTRY|[9]|01p2|Logger.log(String)\n\
12:00:00.003 (3000000)|METHOD_EXIT|[9]|Logger\n\
12:00:00.004 (4000000)|METHOD_ENTRY|[9]|01p2|Logger.log(String)\n\
12:00:00.005 (5000000)|METHOD_EXIT|[9]|Logger\n\
12:00:00.008 (8000000)|METHOD_EXIT|[1]|AccountHandler\n\
12:00:00.009 (9000000)|CODE_UNIT_FINISHED|AccountTrigger on Account trigger event BeforeInsert";

#[test]
fn folder_batch_renders_every_log() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("one.log"), LOG).unwrap();
    fs::write(dir.path().join("nested/two.log"), LOG).unwrap();
    fs::write(dir.path().join("readme.md"), "not a log").unwrap();

    let paths = LogLoader::collect(&[], &[dir.path().to_path_buf()]).unwrap();
    assert_eq!(paths.len(), 2);
    let inputs = LogLoader::load(&paths).unwrap();

    let config = AppConfig::default();
    let exporter = exporter_for(OutputFormat::Json, false);
    let usecase = AnalyzeUsecase { config: &config, exporter: exporter.as_ref() };
    let results = usecase.run_batch(&inputs, &View::Graph);
    assert_eq!(results.len(), 2);
    for (source, rendered) in results {
        let json: serde_json::Value = serde_json::from_str(&rendered.unwrap()).unwrap();
        assert_eq!(json["source"], source.as_str());
        let ids: Vec<&str> = json["graph"]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["Trigger:AccountTrigger", "Class:AccountHandler", "Class:Logger"]);
    }
}

#[test]
fn config_file_drives_filtering_and_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apex-log-graph.toml");
    fs::write(
        &path,
        "[filter]\ncollapse_repeats = true\nhidden_actors = [\"Class:AccountHandler\"]\n\n[output]\nformat = \"json\"\n",
    )
    .unwrap();
    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.output.format, OutputFormat::Json);

    let exporter = exporter_for(config.output.format, config.output.pretty);
    let usecase = AnalyzeUsecase { config: &config, exporter: exporter.as_ref() };
    let report = usecase.analyze("trigger.log", LOG, &View::Graph);

    // Unit frame plus one folded Logger frame.
    assert_eq!(report.frames.len(), 2);
    let logger = &report.frames[1];
    assert_eq!(logger.frame.actor, "Class:Logger");
    assert_eq!(logger.count, Some(2));
    assert_eq!(logger.frame.profile.as_ref().and_then(|p| p.time_ms), Some(2));
    // The graph itself is never filtered.
    assert_eq!(report.graph.nested.len(), 4);
}

#[test]
fn tree_views_render_as_dot_and_text() {
    let config = AppConfig::default();
    let dot = exporter_for(OutputFormat::Dot, false);
    let rendered = AnalyzeUsecase { config: &config, exporter: dot.as_ref() }
        .run("t.log", LOG, &View::Merge("Logger#log(String)".into()))
        .unwrap();
    assert!(rendered.starts_with("digraph CallTree {"));
    assert!(rendered.contains("\"merged:Logger#log(String)\""));

    let text = exporter_for(OutputFormat::Text, false);
    let rendered = AnalyzeUsecase { config: &config, exporter: text.as_ref() }
        .run("t.log", LOG, &View::Backtrace("Logger#log(String)".into()))
        .unwrap();
    assert!(rendered.contains("Logger.log(String) x2"));
    assert!(rendered.contains("AccountHandler.beforeInsert(List<Account>) x1"));
}

#[test]
fn missing_config_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn same_named_logs_render_to_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir_all(logs.join("nested")).unwrap();
    fs::write(logs.join("one.log"), LOG).unwrap();
    fs::write(logs.join("nested/one.log"), LOG).unwrap();

    let paths = LogLoader::collect(&[], &[logs]).unwrap();
    let inputs = LogLoader::load(&paths).unwrap();
    let config = AppConfig::default();
    let exporter = exporter_for(OutputFormat::Json, false);
    let usecase = AnalyzeUsecase { config: &config, exporter: exporter.as_ref() };

    let sources: Vec<String> = inputs.iter().map(|(source, _)| source.clone()).collect();
    let names = LogLoader::output_names(&sources, exporter.extension());
    assert_eq!(names, vec!["one.json", "one-2.json"]);

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    for ((_, rendered), name) in usecase.run_batch(&inputs, &View::Graph).into_iter().zip(&names) {
        fs::write(out.join(name), rendered.unwrap()).unwrap();
    }
    for (source, name) in sources.iter().zip(&names) {
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out.join(name)).unwrap()).unwrap();
        assert_eq!(json["source"], source.as_str());
    }
}
