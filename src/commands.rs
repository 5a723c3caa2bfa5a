use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::attendance::{self, DayReport, SortOrder};
use crate::config::AppConfig;
use crate::db;
use crate::db::boards::{BoardKind, NewRound};
use crate::error::AppError;
use crate::links;
use crate::poll::RefreshTimer;
use crate::ranking;
use crate::report;
use crate::roles::Operator;
use crate::server::{self, AppState};
use crate::sessions;
use crate::stats;
use crate::{
    ActivenessCommand, AttendanceCommand, BatchCommand, Commands, DayView, LeaderboardCommand,
    LinkCommand, RoleCommand, SessionCommand, StatsCommand, StudentCommand,
};

/// Everything a command needs, passed down explicitly.
pub struct AppContext {
    pub pool: PgPool,
    pub config: AppConfig,
    pub operator: Operator,
}

pub async fn dispatch(command: Commands, ctx: &AppContext) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(&ctx.pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            ctx.operator.require_admin()?;
            db::seed(&ctx.pool, ctx.operator.email.as_deref()).await?;
            println!("Seed data inserted.");
        }
        Commands::Batch { action } => batch(action, ctx).await?,
        Commands::Student { action } => student(action, ctx).await?,
        Commands::Session { action } => session(action, ctx).await?,
        Commands::Attendance { action } => attendance(action, ctx).await?,
        Commands::Stats { action } => stats_command(action, ctx).await?,
        Commands::Link { action } => link(action, ctx).await?,
        Commands::Leaderboard { action } => leaderboard(action, ctx).await?,
        Commands::Activeness { action } => activeness(action, ctx).await?,
        Commands::Role { action } => role(action, ctx).await?,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| ctx.config.bind_addr.clone());
            let state = AppState {
                pool: ctx.pool.clone(),
                config: Arc::new(ctx.config.clone()),
            };
            println!("Serving public views on http://{bind}");
            server::serve(state, &bind).await?;
        }
    }
    Ok(())
}

async fn batch(action: BatchCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    match action {
        BatchCommand::Create { name, description } => {
            ctx.operator.require_editor()?;
            let batch =
                db::batches::create(pool, &name, &description, ctx.operator.email.as_deref())
                    .await?;
            println!("Created batch {} ({}).", batch.name, batch.id);
            print_batches(pool, false).await?;
        }
        BatchCommand::List { all } => print_batches(pool, all).await?,
        BatchCommand::Update {
            batch,
            name,
            description,
        } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            let updated =
                db::batches::update(pool, found.id, name.as_deref(), description.as_deref())
                    .await?;
            println!("Updated batch {}.", updated.name);
        }
        BatchCommand::Activate { batch } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            db::batches::set_active(pool, found.id, true).await?;
            println!("Batch {} is active.", found.name);
        }
        BatchCommand::Deactivate { batch } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            db::batches::set_active(pool, found.id, false).await?;
            println!("Batch {} is deactivated.", found.name);
        }
        BatchCommand::Delete { batch } => {
            ctx.operator.require_admin()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            db::batches::delete(pool, found.id).await?;
            tracing::info!(batch = %found.name, "batch deleted");
            println!("Deleted batch {} and everything in it.", found.name);
        }
    }
    Ok(())
}

async fn print_batches(pool: &PgPool, include_inactive: bool) -> anyhow::Result<()> {
    let batches = db::batches::list(pool, include_inactive).await?;
    if batches.is_empty() {
        println!("No batches yet.");
        return Ok(());
    }
    for batch in batches {
        println!(
            "- {} [{}] {} (created {})",
            batch.name,
            if batch.is_active { "active" } else { "inactive" },
            batch.description,
            batch.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

async fn student(action: StudentCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    match action {
        StudentCommand::Add { batch, name, email } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            let student = db::batches::add_student(pool, &found, &name, email.as_deref()).await?;
            println!("Added {} to {}.", student.name, found.name);
        }
        StudentCommand::List { batch } => {
            let found = db::batches::find_by_name(pool, &batch).await?;
            let students = db::batches::list_students(pool, found.id).await?;
            if students.is_empty() {
                println!("{} has no students yet.", found.name);
            }
            for student in students {
                println!(
                    "- {} {}",
                    student.name,
                    student.email.as_deref().unwrap_or("")
                );
            }
        }
        StudentCommand::Remove { batch, name } => {
            ctx.operator.require_admin()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            db::batches::remove_student(pool, found.id, &name).await?;
            println!("Removed {name} from {}.", found.name);
        }
    }
    Ok(())
}

async fn session(action: SessionCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let base_url = &ctx.config.public_base_url;
    match action {
        SessionCommand::Create { batch, date, name } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let created = db::sessions::create(pool, &found, date, name.as_deref()).await?;
            println!("Created {} with code {}.", created.name, created.code);
            println!("Share: {}", sessions::share_url(base_url, &created.code));
        }
        SessionCommand::List { batch, month } => {
            let batch_id = resolve_batch_id(pool, batch.as_deref()).await?;
            let (year, month) = month.unwrap_or_else(current_month);
            let (from, to) = attendance::month_bounds(year, month)?;
            let listed = db::sessions::list_between(pool, from, to, batch_id).await?;
            if listed.is_empty() {
                println!("No sessions in {year}-{month:02}.");
            }
            let now = Utc::now();
            for session in listed {
                println!(
                    "- {} {} {} [{}]",
                    session.session_date,
                    session.code,
                    session.name,
                    sessions::state(&session, now).label()
                );
            }
        }
        SessionCommand::Update { code, name, date } => {
            ctx.operator.require_editor()?;
            let found = db::sessions::require_by_code(pool, &code).await?;
            let updated = db::sessions::update(pool, &found, name.as_deref(), date).await?;
            println!(
                "Updated {} ({}), expires {}.",
                updated.name, updated.session_date, updated.expires_at
            );
        }
        SessionCommand::Toggle { code } => {
            ctx.operator.require_editor()?;
            let found = db::sessions::require_by_code(pool, &code).await?;
            db::sessions::set_active(pool, found.id, !found.is_active).await?;
            let refreshed = db::sessions::require_by_code(pool, &code).await?;
            println!(
                "Session {} is now {}.",
                refreshed.code,
                sessions::state(&refreshed, Utc::now()).label()
            );
        }
        SessionCommand::Delete { code } => {
            ctx.operator.require_admin()?;
            let found = db::sessions::require_by_code(pool, &code).await?;
            db::sessions::delete(pool, found.id).await?;
            println!("Deleted session {} ({}).", found.code, found.session_date);
        }
        SessionCommand::Url { code } => {
            let found = db::sessions::require_by_code(pool, &code).await?;
            println!("{}", sessions::share_url(base_url, &found.code));
        }
    }
    Ok(())
}

async fn attendance(action: AttendanceCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    match action {
        AttendanceCommand::Calendar { month, batch } => {
            let batch_id = resolve_batch_id(pool, batch.as_deref()).await?;
            let (year, month) = month.unwrap_or_else(current_month);
            let (from, to) = attendance::month_bounds(year, month)?;
            let calendar =
                attendance::build_calendar(db::sessions::counts_between(pool, from, to, batch_id).await?);
            print!("{}", attendance::render_calendar(year, month, &calendar)?);
            println!();
            for cell in calendar.values() {
                println!(
                    "{}  {}  {} present  {:.0}%  {:?}",
                    cell.date, cell.session.code, cell.count, cell.percentage, cell.bucket
                );
            }
        }
        AttendanceCommand::Show { view, csv } => {
            let Some(day) = load_day(pool, &view).await? else {
                println!("No session on {}.", view.date);
                return Ok(());
            };
            print_day(&day);
            if let Some(path) = csv {
                let path = if path.as_os_str().is_empty() {
                    PathBuf::from(attendance::export_filename(&day.session))
                } else {
                    path
                };
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let written = attendance::write_csv(&day.rows, file)?;
                println!("Exported {written} rows to {}.", path.display());
            }
        }
        AttendanceCommand::Watch { view } => {
            let pool = pool.clone();
            let period = ctx.config.dashboard_refresh();
            let mut timer = RefreshTimer::start(period, move || {
                let pool = pool.clone();
                let view = view.clone();
                async move {
                    match load_day(&pool, &view).await {
                        Ok(Some(day)) => print_day(&day),
                        Ok(None) => println!("No session on {}.", view.date),
                        Err(err) => println!("{err}"),
                    }
                }
            });
            tokio::signal::ctrl_c().await?;
            timer.stop();
        }
    }
    Ok(())
}

/// Selected session for a date plus its filtered, sorted rows.
async fn load_day(pool: &PgPool, view: &DayView) -> Result<Option<DayReport>, AppError> {
    let batch_id = resolve_batch_id(pool, view.batch.as_deref()).await?;
    let Some(session) = db::sessions::find_for_date(pool, view.date, batch_id).await? else {
        return Ok(None);
    };
    let records = db::sessions::records(pool, session.id).await?;
    let totals =
        stats::build_student_stats(db::stats::student_attendance(pool, session.batch_id).await?);

    let mut order = SortOrder::default();
    if view.desc {
        order = order.toggle();
    }
    Ok(Some(DayReport::build(
        session,
        &records,
        &totals,
        view.search.as_deref().unwrap_or(""),
        view.sort,
        order,
    )))
}

fn print_day(day: &DayReport) {
    println!("{}", day.header(Utc::now()));
    for row in &day.rows {
        println!(
            "  {:<24} {:>3} present  {:>5.1}%  marked {}",
            row.student_name,
            row.present_count,
            row.percentage,
            row.marked_at.format("%H:%M")
        );
    }
}

async fn stats_command(action: StatsCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    match action {
        StatsCommand::Batch { batch, json } => {
            let found = db::batches::find_by_name(pool, &batch).await?;
            let overview = db::stats::overview(pool, found.id).await?;
            let students =
                stats::build_student_stats(db::stats::student_attendance(pool, found.id).await?);
            if json {
                let payload = serde_json::json!({
                    "batch": found.name,
                    "overview": overview,
                    "students": students,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }
            println!(
                "{}: {} students, {} sessions, {:.1}% average attendance",
                found.name,
                overview.student_count,
                overview.session_count,
                stats::round1(overview.average_attendance)
            );
            for student in students {
                println!(
                    "- {} {}/{} ({:.1}%)",
                    student.student_name,
                    student.present_count,
                    student.total_sessions,
                    student.percentage
                );
            }
        }
        StatsCommand::Report { batch, out } => {
            let found = db::batches::find_by_name(pool, &batch).await?;
            let overview = db::stats::overview(pool, found.id).await?;
            let students =
                stats::build_student_stats(db::stats::student_attendance(pool, found.id).await?);
            let report = report::build_report(&found, &overview, &students, Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        StatsCommand::Watch { public_id } => {
            let pool = pool.clone();
            let period = ctx.config.public_refresh();
            let mut timer = RefreshTimer::start(period, move || {
                let pool = pool.clone();
                let public_id = public_id.clone();
                async move {
                    if let Err(err) = print_public_stats(&pool, &public_id).await {
                        println!("{err}");
                    }
                }
            });
            tokio::signal::ctrl_c().await?;
            timer.stop();
        }
    }
    Ok(())
}

async fn print_public_stats(pool: &PgPool, public_id: &str) -> anyhow::Result<()> {
    let link = db::links::find(pool, public_id).await?;
    let link = links::classify(link.as_ref(), Utc::now())?;
    let overview = db::stats::overview(pool, link.batch_id).await?;
    let students = stats::build_student_stats(db::stats::student_attendance(pool, link.batch_id).await?);
    println!(
        "[{}] {} students, {} sessions, {:.1}% average",
        Utc::now().format("%H:%M:%S"),
        overview.student_count,
        overview.session_count,
        stats::round1(overview.average_attendance)
    );
    for student in students {
        println!("  {} {:.1}%", student.student_name, student.percentage);
    }
    Ok(())
}

async fn link(action: LinkCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let base_url = &ctx.config.public_base_url;
    match action {
        LinkCommand::Create { batch } => {
            ctx.operator.require_editor()?;
            let found = db::batches::find_by_name(pool, &batch).await?;
            let created = db::links::create(pool, found.id).await?;
            println!(
                "{} (expires {})",
                links::public_url(base_url, "batch", &created.public_id),
                created.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        LinkCommand::List { batch } => {
            let found = db::batches::find_by_name(pool, &batch).await?;
            let all = db::links::list_for_batch(pool, found.id).await?;
            let now = Utc::now();
            match links::active_link(&all, now) {
                Some(active) => println!(
                    "Active link: {}",
                    links::public_url(base_url, "batch", &active.public_id)
                ),
                None => println!("No active link for {}.", found.name),
            }
            for item in &all {
                let last = item
                    .last_accessed_at
                    .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                println!(
                    "- {} [{}] expires {} last accessed {}",
                    item.public_id,
                    links::status_label(item, now),
                    item.expires_at.format("%Y-%m-%d %H:%M"),
                    last
                );
            }
        }
        LinkCommand::Revoke { public_id } => {
            ctx.operator.require_admin()?;
            db::links::revoke(pool, &public_id).await?;
            println!("Revoked {public_id}.");
        }
        LinkCommand::Check { public_id } => {
            let found = db::links::find(pool, &public_id).await?;
            match links::classify(found.as_ref(), Utc::now()) {
                Ok(live) => println!(
                    "{} is valid until {}.",
                    live.public_id,
                    live.expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
                Err(err) => println!("{err}."),
            }
        }
    }
    Ok(())
}

async fn leaderboard(action: LeaderboardCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let base_url = &ctx.config.public_base_url;
    match action {
        LeaderboardCommand::Create { name, description } => {
            ctx.operator.require_editor()?;
            let board = db::boards::create_leaderboard(pool, &name, &description).await?;
            println!("Created leaderboard {} ({}).", board.name, board.id);
        }
        LeaderboardCommand::List => {
            for board in db::boards::list_leaderboards(pool).await? {
                println!(
                    "- {} {} [{}]",
                    board.id,
                    board.name,
                    if board.is_public { "public" } else { "private" }
                );
            }
        }
        LeaderboardCommand::Show { id } => {
            let board = db::boards::leaderboard(pool, id).await?;
            let rounds = db::boards::rounds(pool, board.id).await?;
            let summary = ranking::summarize_rounds(&rounds);
            println!("{}", board.name);
            println!(
                "{} rounds, {} students, {} interviewers, average {:.1}, best {}",
                summary.total_rounds,
                summary.students,
                summary.interviewers,
                summary.average_score,
                summary.max_score
            );
            for (rank, round) in rounds.iter().enumerate() {
                println!(
                    "{:>3}. {:<24} {:>3}  round {} with {} on {} ({})",
                    rank + 1,
                    round.student_name,
                    round.score,
                    round.round_number,
                    round.interviewer,
                    round.interview_date,
                    round.id
                );
            }
        }
        LeaderboardCommand::AddRound {
            id,
            student,
            score,
            interviewer,
            round,
            date,
            notes,
        } => {
            ctx.operator.require_editor()?;
            let board = db::boards::leaderboard(pool, id).await?;
            let added = db::boards::add_round(
                pool,
                board.id,
                NewRound {
                    student_name: &student,
                    score,
                    interviewer: &interviewer,
                    round_number: round,
                    interview_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                    notes: &notes,
                },
            )
            .await?;
            println!("Recorded {} for {} on {}.", added.score, added.student_name, board.name);
        }
        LeaderboardCommand::DeleteRound { round_id } => {
            ctx.operator.require_admin()?;
            db::boards::delete_round(pool, round_id).await?;
            println!("Deleted round {round_id}.");
        }
        LeaderboardCommand::Publish { id, off } => {
            ctx.operator.require_editor()?;
            let board = db::boards::leaderboard(pool, id).await?;
            publish(pool, BoardKind::Leaderboard, board.id, !off).await?;
            if !off {
                println!("{}", links::public_url(base_url, "leaderboard", &board.public_id));
            }
        }
        LeaderboardCommand::Delete { id } => {
            ctx.operator.require_admin()?;
            db::boards::delete_board(pool, BoardKind::Leaderboard, id).await?;
            println!("Deleted leaderboard {id}.");
        }
    }
    Ok(())
}

async fn activeness(action: ActivenessCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let base_url = &ctx.config.public_base_url;
    match action {
        ActivenessCommand::Create { name, description } => {
            ctx.operator.require_editor()?;
            let board = db::boards::create_activeness_board(pool, &name, &description).await?;
            println!("Created activeness board {} ({}).", board.name, board.id);
        }
        ActivenessCommand::List => {
            for board in db::boards::list_activeness_boards(pool).await? {
                println!(
                    "- {} {} [{}]",
                    board.id,
                    board.name,
                    if board.is_public { "public" } else { "private" }
                );
            }
        }
        ActivenessCommand::Show { id } => {
            let board = db::boards::activeness_board(pool, id).await?;
            let scores = db::boards::scores(pool, board.id).await?;
            let summary = ranking::summarize_scores(&scores);
            println!("{}", board.name);
            println!(
                "{} scores, {} students, {} modules, average {:.1}, best {}",
                summary.total_scores,
                summary.students,
                summary.modules,
                summary.average_score,
                summary.max_score
            );
            for (rank, average) in ranking::student_averages(&scores).iter().enumerate() {
                println!(
                    "{:>3}. {:<24} {:>4.1} across {} modules",
                    rank + 1,
                    average.student_name,
                    average.average_score,
                    average.modules
                );
            }
            for score in &scores {
                println!(
                    "     {} / {}: {} ({})",
                    score.student_name, score.module_name, score.score, score.id
                );
            }
        }
        ActivenessCommand::AddScore {
            id,
            student,
            module,
            score,
        } => {
            ctx.operator.require_editor()?;
            let board = db::boards::activeness_board(pool, id).await?;
            let added = db::boards::add_score(pool, board.id, &student, &module, score).await?;
            println!(
                "Recorded {}/10 for {} in {}.",
                added.score, added.student_name, added.module_name
            );
        }
        ActivenessCommand::DeleteScore { score_id } => {
            ctx.operator.require_admin()?;
            db::boards::delete_score(pool, score_id).await?;
            println!("Deleted score {score_id}.");
        }
        ActivenessCommand::Publish { id, off } => {
            ctx.operator.require_editor()?;
            let board = db::boards::activeness_board(pool, id).await?;
            publish(pool, BoardKind::Activeness, board.id, !off).await?;
            if !off {
                println!("{}", links::public_url(base_url, "activeness", &board.public_id));
            }
        }
        ActivenessCommand::Delete { id } => {
            ctx.operator.require_admin()?;
            db::boards::delete_board(pool, BoardKind::Activeness, id).await?;
            println!("Deleted activeness board {id}.");
        }
    }
    Ok(())
}

async fn publish(pool: &PgPool, kind: BoardKind, id: Uuid, is_public: bool) -> anyhow::Result<()> {
    db::boards::set_public(pool, kind, id, is_public).await?;
    println!(
        "Board is now {}.",
        if is_public { "public" } else { "private" }
    );
    Ok(())
}

async fn role(action: RoleCommand, ctx: &AppContext) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    match action {
        RoleCommand::Grant { email, role } => {
            ctx.operator.require_admin()?;
            db::roles::grant(pool, &email, role).await?;
            println!("{email} is now {role}.");
        }
        RoleCommand::Revoke { email } => {
            ctx.operator.require_admin()?;
            db::roles::revoke(pool, &email).await?;
            println!("Revoked role for {email}.");
        }
        RoleCommand::List => {
            for entry in db::roles::list(pool).await? {
                println!("- {} {}", entry.email, entry.role);
            }
        }
    }
    Ok(())
}

async fn resolve_batch_id(pool: &PgPool, batch: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match batch {
        Some(name) => Ok(Some(db::batches::find_by_name(pool, name).await?.id)),
        None => Ok(None),
    }
}

fn current_month() -> (i32, u32) {
    let today = Utc::now().date_naive();
    (today.year(), today.month())
}
