//! Command-line subcommands and their execution.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use color_eyre::Result;
use tracing::warn;

use crate::api::{ApiError, ErrorKind, Transport};
use crate::app::App;
use crate::services::deliverables::{
  completion_percentage, format_due_date, status_label, DeliverableFilter, DeliverableStatus,
};
use crate::services::disputes::format_amount;
use crate::services::media::{LocalFile, MediaCategory, UploadOptions};
use crate::services::notifications::{format_relative_time, HistoryQuery, DEFAULT_POLL_INTERVAL};
use crate::services::payments::estimate_payout;
use crate::services::social::PostRequirements;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
  /// Probe every configured service
  Health,
  /// List payout tiers
  Tiers,
  /// Show the tier for a follower count
  Tier {
    #[arg(long)]
    followers: u64,
  },
  /// Calculate a payout, estimating locally when the service is unreachable
  Payout {
    #[arg(long)]
    amount: f64,
    #[arg(long)]
    followers: u64,
    /// Tier multiplier used for the offline estimate
    #[arg(long, default_value_t = 1.0)]
    multiplier: f64,
  },
  /// List a deal's deliverables
  Deliverables {
    #[arg(long)]
    deal: u64,
    #[arg(long)]
    status: Option<DeliverableStatus>,
  },
  /// Show recent notifications
  Notifications {
    #[arg(long)]
    user: u64,
    #[arg(long)]
    unread: bool,
    /// Keep polling and print the unread count as it changes
    #[arg(long)]
    watch: bool,
  },
  /// Check a social post against deal requirements
  VerifyPost {
    #[arg(long)]
    url: String,
    #[arg(long = "hashtag")]
    hashtags: Vec<String>,
    #[arg(long = "mention")]
    mentions: Vec<String>,
  },
  /// Upload local files to the media library
  Upload {
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(long, default_value = "general")]
    category: MediaCategory,
    #[arg(long)]
    related_id: Option<u64>,
    #[arg(long)]
    related_type: Option<String>,
  },
  /// Store a bearer token for later requests
  Login {
    #[arg(long)]
    token: String,
  },
  /// Remove the stored bearer token
  Logout,
}

/// Run one command, writing human-readable output to `out`.
///
/// Returns `false` when the command completed but found a problem worth a
/// non-zero exit status (an unhealthy service, a failed upload).
pub async fn run<T: Transport, W: Write>(
  app: &App<T>,
  command: Command,
  out: &mut W,
) -> Result<bool> {
  match command {
    Command::Health => health(app, out).await,
    Command::Tiers => {
      let tiers = app.payments.get_all_tiers().await?.into_data();
      for tier in tiers.tiers {
        let range = match tier.max_followers {
          Some(max) => format!("{}-{}", tier.min_followers, max),
          None => format!("{}+", tier.min_followers),
        };
        writeln!(out, "{:<12} x{:<6.2} {} followers", tier.tier_name, tier.multiplier, range)?;
      }
      Ok(true)
    }
    Command::Tier { followers } => {
      let tier = app.payments.get_tier_by_followers(followers).await?.into_data();
      writeln!(out, "Tier: {} (x{:.2})", tier.current_tier, tier.multiplier)?;
      if let Some(next) = tier.followers_to_next_tier {
        writeln!(out, "{} followers to the next tier", next)?;
      }
      Ok(true)
    }
    Command::Payout {
      amount,
      followers,
      multiplier,
    } => payout(app, amount, followers, multiplier, out).await,
    Command::Deliverables { deal, status } => {
      let filter = DeliverableFilter {
        status,
        ..Default::default()
      };
      let deliverables = app.deliverables.get_deliverables(deal, &filter).await?.into_data();
      let now = Utc::now();
      for item in &deliverables {
        let due = item
          .due()
          .map(|due| format_due_date(due, now))
          .unwrap_or_else(|| "No due date".to_string());
        writeln!(
          out,
          "#{:<6} {:<32} {:<20} {}",
          item.id,
          item.title.as_deref().unwrap_or("(untitled)"),
          status_label(&item.status),
          due
        )?;
      }
      writeln!(
        out,
        "{} deliverables, {}% approved",
        deliverables.len(),
        completion_percentage(&deliverables)
      )?;
      Ok(true)
    }
    Command::Notifications {
      user,
      unread,
      watch,
    } => notifications(app, user, unread, watch, out).await,
    Command::VerifyPost {
      url,
      hashtags,
      mentions,
    } => {
      let requirements = PostRequirements {
        required_hashtags: hashtags,
        required_mentions: mentions,
        ..Default::default()
      };
      let result = app.social.verify_post(&url, &requirements).await?;
      writeln!(out, "{}", serde_json::to_string_pretty(&result.data)?)?;
      Ok(true)
    }
    Command::Upload {
      files,
      category,
      related_id,
      related_type,
    } => {
      let options = UploadOptions {
        category,
        related_id,
        related_type,
        ..Default::default()
      };
      upload(app, &files, &options, out).await
    }
    Command::Login { token } => {
      app.login(&token)?;
      writeln!(out, "Logged in")?;
      Ok(true)
    }
    Command::Logout => {
      let removed = app.logout()?;
      writeln!(out, "{}", if removed { "Logged out" } else { "No stored credential" })?;
      Ok(true)
    }
  }
}

async fn health<T: Transport, W: Write>(app: &App<T>, out: &mut W) -> Result<bool> {
  let reports = app.health_check().await;
  for report in &reports {
    match &report.outcome {
      Ok(()) => writeln!(out, "{:<14} {:<28} ok", report.service.as_str(), report.url)?,
      Err(err) => writeln!(
        out,
        "{:<14} {:<28} DOWN ({})",
        report.service.as_str(),
        report.url,
        err
      )?,
    }
  }
  Ok(reports.iter().all(|r| r.is_healthy()))
}

async fn payout<T: Transport, W: Write>(
  app: &App<T>,
  amount: f64,
  followers: u64,
  multiplier: f64,
  out: &mut W,
) -> Result<bool> {
  match app.payments.calculate_payout(amount, followers).await {
    Ok(result) => {
      let calc = result.data;
      writeln!(out, "Tier: {}", calc.tier_name)?;
      if let Some(fee) = calc.service_fee {
        writeln!(out, "Service fee: {}", format_amount(fee))?;
      }
      writeln!(out, "Net payout: {}", format_amount(calc.net_payout))?;
    }
    Err(err) if err.kind() == ErrorKind::Validation => return Err(err.into()),
    Err(err) => {
      warn!(error = %err, "payout calculation failed, using local estimate");
      let estimate = estimate_payout(amount, multiplier);
      writeln!(out, "Platform fee: {}", format_amount(estimate.platform_fee))?;
      writeln!(out, "Estimated payout: {} (offline estimate)", format_amount(estimate.payout))?;
    }
  }
  Ok(true)
}

async fn notifications<T: Transport, W: Write>(
  app: &App<T>,
  user: u64,
  unread_only: bool,
  watch: bool,
  out: &mut W,
) -> Result<bool> {
  let query = HistoryQuery {
    unread_only,
    ..Default::default()
  };
  let page = app
    .notifications
    .get_notification_history(user, query)
    .await?
    .into_data();
  let now = Utc::now();
  for item in &page.notifications {
    let when = item
      .created_at
      .map(|at| format_relative_time(at, now))
      .unwrap_or_default();
    let marker = if item.is_read { " " } else { "*" };
    writeln!(out, "{} {:<40} {}", marker, item.title, when)?;
  }
  writeln!(out, "{} unread", page.unread_count)?;

  if watch {
    let mut updates = app.notifications.subscribe_unread();
    let poller = Arc::clone(&app.notifications).start_polling(user, DEFAULT_POLL_INTERVAL);
    loop {
      tokio::select! {
        changed = updates.changed() => {
          if changed.is_err() {
            break;
          }
          let count = *updates.borrow_and_update();
          writeln!(out, "{} unread", count)?;
        }
        _ = tokio::signal::ctrl_c() => break,
      }
    }
    poller.abort();
  }
  Ok(true)
}

async fn upload<T: Transport, W: Write>(
  app: &App<T>,
  files: &[PathBuf],
  options: &UploadOptions,
  out: &mut W,
) -> Result<bool> {
  let mut local = Vec::with_capacity(files.len());
  for path in files {
    local.push(LocalFile::read(path).await?);
  }
  let report = app.media.upload_files(local, options).await;
  for item in &report.successful {
    let url = item.data.get("url").and_then(|u| u.as_str()).unwrap_or("");
    writeln!(out, "uploaded {:<32} {}", item.file_name, url)?;
  }
  for item in &report.failed {
    writeln!(out, "FAILED   {:<32} {}", item.file_name, describe(&item.error))?;
  }
  Ok(report.is_success())
}

/// Map a library error to the message shown to the user.
pub fn describe(err: &ApiError) -> String {
  match err.kind() {
    ErrorKind::Validation => format!("Invalid input: {}", err.message()),
    ErrorKind::Transport => format!("Could not reach the service: {}", err.message()),
    ErrorKind::Http => err.to_string(),
  }
}

/// Best-effort conversion for the CLI's exit path.
pub fn user_message(report: &color_eyre::Report) -> String {
  match report.downcast_ref::<ApiError>() {
    Some(err) => describe(err),
    None => report.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::credentials::anonymous;
  use crate::api::mock::MockTransport;
  use crate::config::Config;
  use serde_json::json;

  fn app(transport: &Arc<MockTransport>) -> App<MockTransport> {
    App::with_transport(&Config::default(), Arc::clone(transport), anonymous()).unwrap()
  }

  async fn output(app: &App<MockTransport>, command: Command) -> (Result<bool>, String) {
    let mut out = Vec::new();
    let result = run(app, command, &mut out).await;
    (result, String::from_utf8(out).unwrap())
  }

  #[tokio::test]
  async fn test_payout_falls_back_to_estimate() {
    let transport = MockTransport::new();
    transport.fail("connection refused");
    let app = app(&transport);

    let (result, text) = output(
      &app,
      Command::Payout {
        amount: 1000.0,
        followers: 5000,
        multiplier: 1.0,
      },
    )
    .await;
    assert!(result.unwrap());
    assert!(text.contains("Platform fee: $200.00"));
    assert!(text.contains("Estimated payout: $776.50 (offline estimate)"));
  }

  #[tokio::test]
  async fn test_payout_uses_server_calculation() {
    let transport = MockTransport::new();
    transport.json(
      200,
      json!({"deal_amount": 1000.0, "tier_name": "silver", "net_payout": 840.0, "service_fee": 160.0}),
    );
    let app = app(&transport);

    let (result, text) = output(
      &app,
      Command::Payout {
        amount: 1000.0,
        followers: 5000,
        multiplier: 1.0,
      },
    )
    .await;
    assert!(result.unwrap());
    assert_eq!(text, "Tier: silver\nService fee: $160.00\nNet payout: $840.00\n");
  }

  #[tokio::test]
  async fn test_tier_validation_surfaces_as_error() {
    let transport = MockTransport::new();
    let app = app(&transport);

    let (result, _) = output(&app, Command::Tier { followers: 100 }).await;
    let report = result.unwrap_err();
    assert_eq!(
      user_message(&report),
      "Invalid input: Minimum 500 followers required"
    );
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_deliverables_listing() {
    let transport = MockTransport::new();
    transport.json(
      200,
      json!([
        {"id": 1, "title": "Launch reel", "status": "approved"},
        {"id": 2, "title": "Story", "status": "in_progress"}
      ]),
    );
    let app = app(&transport);

    let (result, text) = output(
      &app,
      Command::Deliverables {
        deal: 50,
        status: None,
      },
    )
    .await;
    assert!(result.unwrap());
    assert!(text.contains("Launch reel"));
    assert!(text.contains("No due date"));
    assert!(text.ends_with("2 deliverables, 50% approved\n"));
  }

  #[tokio::test]
  async fn test_health_reports_failure() {
    let transport = MockTransport::new();
    for _ in 0..5 {
      transport.json(200, json!({"status": "ok"}));
    }
    transport.fail("connection refused");
    let app = app(&transport);

    let (result, text) = output(&app, Command::Health).await;
    assert!(!result.unwrap());
    assert_eq!(text.lines().count(), 6);
    assert_eq!(text.matches("DOWN").count(), 1);
  }

  #[tokio::test]
  async fn test_upload_reports_rejected_files() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("cover.png");
    let notes = dir.path().join("notes.txt");
    std::fs::write(&image, b"png").unwrap();
    std::fs::write(&notes, b"text").unwrap();

    let transport = MockTransport::new();
    transport.json(201, json!({"media_id": "m1", "url": "https://cdn.test/m1.png"}));
    let app = app(&transport);

    let (result, text) = output(
      &app,
      Command::Upload {
        files: vec![image, notes],
        category: MediaCategory::ProofOfWork,
        related_id: None,
        related_type: None,
      },
    )
    .await;
    assert!(!result.unwrap());
    assert!(text.contains("https://cdn.test/m1.png"));
    assert!(text.contains("Invalid input: File type application/octet-stream is not allowed"));
    assert_eq!(transport.calls(), 1);
  }

  #[test]
  fn test_describe() {
    assert_eq!(
      describe(&ApiError::transport("timed out")),
      "Could not reach the service: timed out"
    );
    assert_eq!(
      describe(&ApiError::Status {
        status: 404,
        message: "Tier not found".into()
      }),
      "http 404: Tier not found"
    );
  }
}
