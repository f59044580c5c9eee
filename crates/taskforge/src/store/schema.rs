// Hand-maintained to mirror `migrations/`. Normally generated by
// `diesel print-schema`; kept in sync by hand here and covered by the
// round-trip tests in `store::tests`.

diesel::table! {
    agents (id) {
        id -> Integer,
        name -> Text,
        role -> Text,
        model -> Text,
        pipeline_id -> Nullable<Integer>,
        is_active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    pipelines (id) {
        id -> Integer,
        name -> Text,
        description -> Text,
        task_type -> Text,
        blocks_json -> Text,
        is_active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Integer,
        title -> Text,
        description -> Text,
        status -> Text,
        assigned_agent_id -> Nullable<Integer>,
        due_date -> Nullable<Text>,
        is_critical -> Bool,
        requires_approval -> Bool,
        schedule_type -> Text,
        cron_expr -> Nullable<Text>,
        interval_minutes -> Nullable<Integer>,
        is_recurring -> Bool,
        next_run_at -> Nullable<Text>,
        last_run_at -> Nullable<Text>,
        last_result -> Text,
        last_error -> Nullable<Text>,
        review_summary -> Text,
        retry_count -> Integer,
        openclaw_job_id -> Nullable<Text>,
        openclaw_job_status -> Nullable<Text>,
        openclaw_last_status_payload -> Text,
        resume_block_index -> Nullable<Integer>,
        resume_pipeline_ref -> Nullable<Integer>,
        created_at -> Text,
        updated_at -> Text,
        review_notes -> Text,
    }
}

diesel::table! {
    decisions (decision_id) {
        decision_id -> Text,
        entity_type -> Text,
        entity_id -> Integer,
        action -> Text,
        status -> Text,
        token_hash -> Text,
        token_salt -> Text,
        expires_at -> Nullable<Text>,
        requested_at -> Text,
        decided_at -> Nullable<Text>,
        requester -> Text,
        decider_ip -> Nullable<Text>,
        decider_ua -> Nullable<Text>,
        result_markdown -> Text,
        error -> Nullable<Text>,
        updated_at -> Nullable<Text>,
    }
}

diesel::table! {
    critiques (id) {
        id -> Integer,
        task_id -> Nullable<Integer>,
        title -> Text,
        body -> Text,
        severity -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    action_logs (id) {
        id -> Integer,
        ts -> Text,
        actor -> Text,
        action -> Text,
        entity_type -> Text,
        entity_id -> Nullable<Text>,
        detail -> Text,
    }
}

diesel::table! {
    routines (id) {
        id -> Text,
        name -> Text,
        kind -> Text,
        is_enabled -> Bool,
        agent_id -> Nullable<Integer>,
        claim_unassigned -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    routine_state (routine_id, key) {
        routine_id -> Text,
        key -> Text,
        value -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    agent_runtime (agent_id) {
        agent_id -> Integer,
        was_running -> Bool,
        updated_at -> Text,
    }
}

diesel::table! {
    executor_log (id) {
        id -> Integer,
        task_id -> Integer,
        pipeline_id -> Nullable<Integer>,
        block_index -> Integer,
        block_kind -> Text,
        model -> Nullable<Text>,
        executor -> Nullable<Text>,
        started_at -> Text,
        duration_ms -> BigInt,
        success -> Bool,
        pass_fail -> Nullable<Text>,
        review_notes -> Text,
        output_preview -> Text,
        failure_type -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    claude_health (id) {
        id -> Integer,
        state -> Text,
        last_success -> Nullable<Text>,
        last_failure -> Nullable<Text>,
        last_failure_type -> Nullable<Text>,
        consecutive_failures -> Integer,
        daily_invocations -> Integer,
        daily_reset_at -> Nullable<Text>,
        updated_at -> Nullable<Text>,
    }
}

diesel::table! {
    local_jobs (job_id) {
        job_id -> Text,
        status -> Text,
        created_at -> Text,
        started_at -> Nullable<Text>,
        finished_at -> Nullable<Text>,
        payload -> Text,
        result -> Text,
        error -> Nullable<Text>,
        logs -> Text,
        used_model -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    agents,
    pipelines,
    tasks,
    decisions,
    critiques,
    action_logs,
    routines,
    routine_state,
    agent_runtime,
    executor_log,
    claude_health,
    local_jobs,
);
