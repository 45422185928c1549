use super::*;
use crate::config::RegistryConfig;

const SCRIPT: &str = r#"{
  "objects": [
    {"id": 1, "kind": "int", "value": 1},
    {"id": 2, "kind": "int", "value": 2},
    {"id": 3, "kind": "list", "items": [1, 2]},
    {"id": 4, "kind": "str", "value": "foo"},
    {"id": 5, "kind": "dict", "entries": [[4, 2]]}
  ],
  "frames": [
    {"id": 100, "function": "outer", "line": 10, "source": "app.py"},
    {"id": 101, "function": "inner", "line": 20, "caller": 100,
     "locals": {"k": 3, "__return_values__": 5}},
    {"id": 200, "function": "coro", "line": 3}
  ],
  "steps": [
    {"op": "suspend", "thread": "T1", "top": 101, "lineOverrides": {"101": 21}},
    {"op": "stackTrace", "thread": "T1"},
    {"op": "variables", "thread": "T1", "frame": 0},
    {"op": "variables", "thread": "T1", "frame": 0, "path": ["k"], "format": {"hex": true}},
    {"op": "suspend", "thread": "T1", "top": 200, "subExecution": "task-1", "reason": "step"},
    {"op": "findFrame", "thread": "T1", "frameId": "*"},
    {"op": "addFabricatedFrame", "thread": "T1", "frameId": 9000, "frame": 200},
    {"op": "findFrame", "thread": "T1", "frameId": "9000"},
    {"op": "findFrame", "thread": "T1", "frameId": "bogus"},
    {"op": "removeFabricatedFrames", "thread": "T1"},
    {"op": "resume", "thread": "T1"},
    {"op": "stackTrace", "thread": "T1"},
    {"op": "variables", "reference": 1}
  ]
}"#;

fn replay(script: &str) -> Result<Vec<Value>> {
    let script = Script::from_json_str(script)?;
    let mut replayer =
        Replayer::new(&script, SuspendedFramesRegistry::builder(RegistryConfig::default()))?;
    replayer.run(&script.steps)
}

#[test]
fn replays_a_full_suspend_episode() {
    let results = replay(SCRIPT).unwrap();
    assert_eq!(results.len(), 13);

    let stopped = &results[0]["stopped"];
    assert_eq!(stopped["reason"], "breakpoint");
    assert_eq!(stopped["threadId"], "T1");
    assert_eq!(stopped["topFrame"]["name"], "inner");
    assert_eq!(stopped["topFrame"]["line"], 21);

    let frames = results[1]["stackFrames"].as_array().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["name"], "outer");
    assert_eq!(frames[1]["source"], "app.py");

    let locals = results[2]["variables"].as_array().unwrap();
    assert_eq!(locals[0]["name"], "(return) foo");
    assert_eq!(locals[0]["evaluateName"], "__return_values__['foo']");
    assert_eq!(locals[0]["presentationHint"]["attributes"][0], "readOnly");
    assert_eq!(locals[1]["name"], "k");
    assert!(locals[1]["variablesReference"].as_i64().unwrap() > 0);

    let children = results[3]["variables"].as_array().unwrap();
    assert_eq!(children[1]["value"], "0x2");
    assert_eq!(children[1]["evaluateName"], "k[1]");
    assert!(children[1].get("variablesReference").is_none());

    assert_eq!(results[4]["stopped"]["reason"], "step");
    assert_eq!(results[4]["stopped"]["topFrame"]["name"], "coro");
    assert_eq!(results[5]["function"], "coro");
    assert_eq!(results[7]["function"], "coro");
    assert!(results[8]["function"].is_null());
    assert_eq!(results[9]["removed"], 1);
    assert_eq!(results[10]["resumed"], true);
    assert!(results[11]["error"]
        .as_str()
        .unwrap()
        .contains("not suspended"));
    assert!(results[12]["error"].as_str().unwrap().contains("not found"));
}

#[test]
fn resuming_an_unknown_thread_reports_false() {
    let results = replay(r#"{"steps": [{"op": "resume", "thread": "T1"}]}"#).unwrap();
    assert_eq!(results[0]["resumed"], false);
}

#[test]
fn thread_for_reference_reports_the_real_thread() {
    let script = Script::from_json_str(
        r#"{
      "objects": [{"id": 1, "kind": "list", "items": []}],
      "frames": [{"id": 10, "function": "coro", "line": 1, "locals": {"xs": 1}}],
      "steps": [
        {"op": "suspend", "thread": "T1", "top": 10, "subExecution": "task"},
        {"op": "variables", "thread": "task"}
      ]
    }"#,
    )
    .unwrap();
    let mut replayer =
        Replayer::new(&script, SuspendedFramesRegistry::builder(RegistryConfig::default()))
            .unwrap();
    let results = replayer.run(&script.steps).unwrap();
    let xs = results[1]["variables"][0]["variablesReference"]
        .as_i64()
        .unwrap();

    let follow_up = replayer
        .run(&[
            Step::ThreadForReference { reference: xs },
            Step::ThreadForReference {
                reference: 1_000_000,
            },
        ])
        .unwrap();
    assert_eq!(follow_up[0]["threadId"], "T1");
    assert!(follow_up[1]["threadId"].is_null());
}

#[test]
fn malformed_line_override_keys_are_rejected() {
    let script = r#"{
      "frames": [{"id": 10, "function": "f", "line": 1}],
      "steps": [{"op": "suspend", "thread": "T1", "top": 10, "lineOverrides": {"ten": 3}}]
    }"#;
    let err = replay(script).unwrap_err();
    assert!(format!("{:#}", err).contains("not a frame id"));
}

#[test]
fn unknown_frames_abort_the_replay() {
    let err = replay(r#"{"steps": [{"op": "suspend", "thread": "T1", "top": 5}]}"#).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown frame 5"));
}

#[test]
fn dangling_object_references_are_rejected() {
    let script = r#"{
      "objects": [{"id": 1, "kind": "list", "items": [2]}],
      "steps": []
    }"#;
    let err = replay(script).unwrap_err();
    assert!(err.to_string().contains("unknown object 2"));
}

#[test]
fn unknown_ops_fail_to_parse() {
    assert!(Script::from_json_str(r#"{"steps": [{"op": "evaluate"}]}"#).is_err());
}
