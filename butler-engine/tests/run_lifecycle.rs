mod common;

use std::sync::Arc;

use butler_core::domain::run::{Owner, OwnerKind, Parameter, RunKind, RunState};
use butler_core::domain::task::TaskState;
use butler_core::dto::run::SubmitRun;
use butler_engine::EngineError;
use butler_engine::executor::{ExecutionOutcome, PipelineFailure, RemoteChannel};
use butler_engine::scheduler::poller::process;
use butler_engine::service::Completion;
use common::{
    FailingSniffer, FakeChannel, Harness, align_pipeline, completion_with, harness, pca_plot,
};

fn alice() -> Owner {
    Owner::user(1, "alice")
}

async fn submit_align(h: &Harness, file_id: i64) -> butler_core::dto::run::Submission {
    h.runs
        .submit(
            RunKind::Analysis,
            SubmitRun {
                owner: alice(),
                definition_uid: "align".to_string(),
                parameters: vec![Parameter::new("input", file_id.to_string())],
            },
        )
        .await
        .unwrap()
}

async fn run_next(h: &Harness, channel: Arc<dyn RemoteChannel>) -> butler_engine::Result<Completion> {
    let task = h.queue.claim("test-worker").await.unwrap().expect("a queued task");
    process(task, Arc::clone(&h.queue), channel, h.completion.clone()).await
}

#[tokio::test]
async fn test_submit_builds_command_and_folder() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;

    let submission = submit_align(&h, file.id).await;
    let run = &submission.run;

    assert_eq!(run.state, RunState::Pending);
    assert_eq!(run.task_id, Some(submission.task_id));
    assert_eq!(run.definition_uid, "align");
    assert!(run.parameters.is_empty());
    assert_eq!(run.input_files.len(), 1);
    assert_eq!(run.input_files[0].field_name, "input");

    let run_dir = h.layout.local_run_dir(&alice(), RunKind::Analysis, run.id).unwrap();
    assert!(run_dir.is_dir());

    let task = h.queue.status(submission.task_id).await.unwrap();
    assert_eq!(task.state, TaskState::Queued);
    assert_eq!(
        task.description.command,
        format!(
            "cd {}; sh {}/align/align.sh {}/a.txt result.txt",
            h.layout.remote_run_dir(&alice(), RunKind::Analysis, run.id).unwrap(),
            h.layout.pipelines_storage,
            h.layout.data_storage,
        )
    );
    assert_eq!(task.description.output_bindings[0].field, "output");
}

#[tokio::test]
async fn test_successful_run_ingests_declared_outputs() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    let channel = Arc::new(FakeChannel::succeeding(vec![
        ("result.txt", "42\n"),
        ("scratch.tmp", "ignored"),
    ]));
    let completion = run_next(&h, channel).await.unwrap();

    let Completion::Succeeded { outputs } = completion else {
        panic!("expected success, got {:?}", completion);
    };
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].name, "result.txt");
    assert_eq!(outputs[0].size_in_bytes, 3);
    assert_eq!(outputs[0].file_format, "txt");
    assert_eq!(outputs[0].owner, alice());
    assert!(!outputs[0].is_upload);
    assert_eq!(
        outputs[0].path,
        format!("alice/analyses/{}/result.txt", submission.run.id)
    );

    let run_id = submission.run.id;
    assert_eq!(h.runs.status(run_id).await.unwrap().state, RunState::Success);
    let output_files = h.runs.output_files(run_id).await.unwrap();
    assert_eq!(output_files.len(), 1);
    assert_eq!(output_files[0].field_name, "output");

    let task = h.queue.status(submission.task_id).await.unwrap();
    assert_eq!(task.state, TaskState::Success);
}

#[tokio::test]
async fn test_repeated_completion_is_a_no_op() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    let channel = Arc::new(FakeChannel::succeeding(vec![("result.txt", "42\n")]));
    run_next(&h, channel).await.unwrap();

    let task = h.queue.status(submission.task_id).await.unwrap();
    let again = h
        .completion
        .complete(
            &task.description,
            ExecutionOutcome::Succeeded {
                stdout: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(again, Completion::AlreadyCompleted(RunState::Success));

    let failed_late = h
        .completion
        .complete(
            &task.description,
            ExecutionOutcome::Failed(PipelineFailure {
                exit_code: 1,
                stdout: String::new(),
                stderr: String::new(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(failed_late, Completion::AlreadyCompleted(RunState::Success));

    assert_eq!(h.count("run_output_files").await, 1);
    assert_eq!(h.runs.status(submission.run.id).await.unwrap().state, RunState::Success);
}

#[tokio::test]
async fn test_failed_run_keeps_logs_and_no_outputs() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    let channel = Arc::new(FakeChannel::failing(2, "step 1 done\n", "reference not found\n"));
    let completion = run_next(&h, channel).await.unwrap();
    assert_eq!(completion, Completion::Failed { exit_code: 2 });

    let run_id = submission.run.id;
    assert_eq!(h.runs.status(run_id).await.unwrap().state, RunState::Failure);
    assert!(h.runs.output_files(run_id).await.unwrap().is_empty());

    let run_dir = h.layout.local_run_dir(&alice(), RunKind::Analysis, run_id).unwrap();
    assert_eq!(
        std::fs::read_to_string(run_dir.join("log.out")).unwrap(),
        "step 1 done\n"
    );
    assert_eq!(
        std::fs::read_to_string(run_dir.join("error.out")).unwrap(),
        "reference not found\n"
    );
}

#[tokio::test]
async fn test_transport_failure_leaves_run_pending() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    let err = run_next(&h, Arc::new(FakeChannel::unreachable()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Transport(_)));

    assert_eq!(
        h.runs.status(submission.run.id).await.unwrap().state,
        RunState::Pending
    );
    let task = h.queue.status(submission.task_id).await.unwrap();
    assert_eq!(task.state, TaskState::Failure);
    assert!(task.error_message.unwrap().contains("Connection refused"));
}

#[tokio::test]
async fn test_rejected_submissions_leave_nothing_behind() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());

    let unknown_file = h
        .runs
        .submit(
            RunKind::Analysis,
            SubmitRun {
                owner: alice(),
                definition_uid: "align".to_string(),
                parameters: vec![Parameter::new("input", "99")],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        unknown_file,
        EngineError::InputFileNotFound { file_id: 99, .. }
    ));

    let mut needs_genome = align_pipeline();
    needs_genome["command"] = "$input $genome".into();
    h.write_pipeline("align", needs_genome);
    let file = h.upload(&alice(), "a.txt").await;

    let unresolved = h
        .runs
        .submit(
            RunKind::Analysis,
            SubmitRun {
                owner: alice(),
                definition_uid: "align".to_string(),
                parameters: vec![Parameter::new("input", file.id.to_string())],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(unresolved, EngineError::UnresolvedPlaceholder(_)));

    let missing = h
        .runs
        .submit(
            RunKind::Analysis,
            SubmitRun {
                owner: alice(),
                definition_uid: "align".to_string(),
                parameters: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::MissingParameter(_)));

    assert_eq!(h.count("runs").await, 0);
    assert_eq!(h.count("run_input_files").await, 0);
    assert_eq!(h.count("tasks").await, 0);
    assert!(!h.layout.local_data_root.join("alice/analyses").exists());
}

#[tokio::test]
async fn test_concurrent_submissions_are_independent() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;

    let (first, second) = tokio::join!(submit_align(&h, file.id), submit_align(&h, file.id));
    assert_ne!(first.run.id, second.run.id);

    let first_dir = h.layout.local_run_dir(&alice(), RunKind::Analysis, first.run.id).unwrap();
    let second_dir = h.layout.local_run_dir(&alice(), RunKind::Analysis, second.run.id).unwrap();
    assert_ne!(first_dir, second_dir);

    let channel: Arc<dyn RemoteChannel> =
        Arc::new(FakeChannel::succeeding(vec![("result.txt", "42\n")]));
    let (a, b) = tokio::join!(run_next(&h, Arc::clone(&channel)), run_next(&h, Arc::clone(&channel)));
    assert!(matches!(a.unwrap(), Completion::Succeeded { .. }));
    assert!(matches!(b.unwrap(), Completion::Succeeded { .. }));

    for run in [&first.run, &second.run] {
        let outputs = h.runs.output_files(run.id).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs[0].file.path,
            format!("alice/analyses/{}/result.txt", run.id)
        );
    }

    let runs = h.runs.list_for_owner(OwnerKind::User, 1).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.run.id.max(first.run.id));
}

#[tokio::test]
async fn test_delete_removes_run_outputs_and_folder() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;
    run_next(&h, Arc::new(FakeChannel::succeeding(vec![("result.txt", "42\n")])))
        .await
        .unwrap();

    let run_id = submission.run.id;
    let run_dir = h.layout.local_run_dir(&alice(), RunKind::Analysis, run_id).unwrap();
    assert!(run_dir.join("result.txt").exists());

    h.runs.delete(run_id).await.unwrap();

    assert!(h.runs.get(run_id).await.unwrap_err().is_not_found());
    assert!(!run_dir.exists());
    assert_eq!(h.count("run_output_files").await, 0);
    assert_eq!(h.count("run_input_files").await, 0);
    // The uploaded input survives, the produced output does not
    assert_eq!(h.count("files").await, 1);

    assert!(matches!(
        h.runs.delete(run_id).await,
        Err(EngineError::RunNotFound(_))
    ));
}

#[tokio::test]
async fn test_ingestion_failure_rolls_back_to_pending() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    let task = h.queue.claim("test-worker").await.unwrap().expect("a queued task");
    let channel = Arc::new(FakeChannel::succeeding(vec![("result.txt", "42\n")]));
    let err = process(
        task,
        Arc::clone(&h.queue),
        channel,
        completion_with(&h, Arc::new(FailingSniffer)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Sniff { .. }));

    let run_id = submission.run.id;
    assert_eq!(h.runs.status(run_id).await.unwrap().state, RunState::Pending);
    assert!(h.runs.output_files(run_id).await.unwrap().is_empty());
    assert_eq!(h.count("run_output_files").await, 0);
    assert_eq!(h.count("files").await, 1);

    let task = h.queue.status(submission.task_id).await.unwrap();
    assert_eq!(task.state, TaskState::Failure);
    assert!(task.error_message.unwrap().contains("command not found"));
}

#[tokio::test]
async fn test_visualization_runs_plot_with_single_output() {
    let h = harness().await;
    h.write_plot("pca", pca_plot());
    let owner = Owner::experiment(7, "e3b0c442");
    let counts = h.upload(&owner, "e3b0c442/counts.tsv").await;

    let submission = h
        .runs
        .submit(
            RunKind::Visualization,
            SubmitRun {
                owner: owner.clone(),
                definition_uid: "pca".to_string(),
                parameters: vec![Parameter::new("counts", counts.id.to_string())],
            },
        )
        .await
        .unwrap();
    let run_id = submission.run.id;
    assert_eq!(submission.run.kind, RunKind::Visualization);
    assert_eq!(submission.run.definition_uid, "pca");

    let run_dir = h.layout.local_run_dir(&owner, RunKind::Visualization, run_id).unwrap();
    assert!(run_dir.is_dir());
    assert!(run_dir.ends_with(format!("e3b0c442/visualizations/{run_id}")));

    let task = h.queue.status(submission.task_id).await.unwrap();
    assert_eq!(
        task.description.command,
        format!(
            "cd {}/e3b0c442/visualizations/{}; Rscript {}/pca.R {}/e3b0c442/counts.tsv pca.png",
            h.layout.data_storage, run_id, h.layout.plots_storage, h.layout.data_storage,
        )
    );
    assert_eq!(task.description.run_kind, RunKind::Visualization);
    assert_eq!(task.description.output_bindings[0].field, "output_file");

    let channel = Arc::new(FakeChannel::succeeding(vec![
        ("pca.png", "PNG"),
        ("Rplots.pdf", "ignored"),
    ]));
    let completion = run_next(&h, channel).await.unwrap();
    let Completion::Succeeded { outputs } = completion else {
        panic!("expected success, got {:?}", completion);
    };
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].owner, owner);
    assert_eq!(
        outputs[0].path,
        format!("e3b0c442/visualizations/{run_id}/pca.png")
    );

    let output_files = h.runs.output_files(run_id).await.unwrap();
    assert_eq!(output_files.len(), 1);
    assert_eq!(output_files[0].field_name, "output_file");
    assert_eq!(h.runs.status(run_id).await.unwrap().state, RunState::Success);

    let runs = h.runs.list_for_owner(OwnerKind::Experiment, 7).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(h.runs.list_for_owner(OwnerKind::User, 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_keeps_definition_uid_snapshot() {
    let h = harness().await;
    h.write_pipeline("align", align_pipeline());
    let file = h.upload(&alice(), "a.txt").await;
    let submission = submit_align(&h, file.id).await;

    sqlx::query("UPDATE definitions SET uid = 'align-v2' WHERE id = ?")
        .bind(submission.run.definition_id)
        .execute(&h.pool)
        .await
        .unwrap();

    let run = h.runs.get(submission.run.id).await.unwrap();
    assert_eq!(run.definition_uid, "align");
    assert_eq!(run.definition_id, submission.run.definition_id);

    let listed = h.runs.list_for_owner(OwnerKind::User, 1).await.unwrap();
    assert_eq!(listed[0].definition_uid, "align");
}
