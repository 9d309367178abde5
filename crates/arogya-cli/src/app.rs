//! Application state machine and event dispatcher.

use std::sync::Arc;

use arogya_core::{audit::AuditEvent, payment::Payment};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};

use crate::client::ApiClient;

// ─── Screen ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
  /// Focus on the pending-payment queue.
  PaymentList,
  /// Focus on the payment detail pane (with audit trail).
  PaymentDetail,
}

/// A decision awaiting confirmation before it is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Verify,
  Reject,
}

impl Decision {
  pub fn verb(&self) -> &'static str {
    match self {
      Self::Verify => "VERIFY",
      Self::Reject => "REJECT",
    }
  }
}

// ─── App ─────────────────────────────────────────────────────────────────────

/// Top-level application state.
pub struct App {
  /// Current screen / keyboard focus.
  pub screen: Screen,

  /// The pending queue as last fetched, oldest first.
  pub payments: Vec<Payment>,

  /// Current fuzzy-filter string (only active when `filter_active`).
  pub filter: String,

  /// Whether the user is typing a filter query.
  pub filter_active: bool,

  /// Cursor position within the *filtered* payment list.
  pub list_cursor: usize,

  /// Scroll offset within the detail audit trail.
  pub detail_scroll: usize,

  /// The payment shown in the detail pane.
  pub selected: Option<Payment>,

  /// Audit trail for the selected payment, oldest first.
  pub trail: Vec<AuditEvent>,

  /// A verify/reject waiting for `y` confirmation.
  pub confirm: Option<(String, Decision)>,

  /// One-line status message shown in the status bar.
  pub status_msg: String,

  /// Shared HTTP client.
  pub client: Arc<ApiClient>,
}

impl App {
  /// Create an [`App`] with an empty queue.
  pub fn new(client: ApiClient) -> Self {
    Self {
      screen: Screen::PaymentList,
      payments: Vec::new(),
      filter: String::new(),
      filter_active: false,
      list_cursor: 0,
      detail_scroll: 0,
      selected: None,
      trail: Vec::new(),
      confirm: None,
      status_msg: String::new(),
      client: Arc::new(client),
    }
  }

  // ── Data loading ──────────────────────────────────────────────────────────

  /// Fetch the pending queue from the API.
  pub async fn load_payments(&mut self) -> anyhow::Result<()> {
    self.status_msg = "Loading pending payments…".into();
    match self.client.list_pending().await {
      Ok(payments) => {
        self.payments = payments;
        if self.list_cursor >= self.payments.len() {
          self.list_cursor = self.payments.len().saturating_sub(1);
        }
        self.status_msg = String::new();
        Ok(())
      }
      Err(e) => {
        self.status_msg = format!("Error: {e}");
        Err(e)
      }
    }
  }

  /// Load the audit trail for `payment_id` into `self.trail`.
  async fn load_trail(&mut self, payment_id: &str) {
    match self.client.audit(payment_id).await {
      Ok(trail) => {
        self.trail = trail;
        self.detail_scroll = 0;
      }
      Err(e) => {
        self.trail.clear();
        self.status_msg = format!("Error: {e}");
      }
    }
  }

  // ── Filtered list ─────────────────────────────────────────────────────────

  /// Payments matching the current filter query, by email or plan.
  pub fn filtered_payments(&self) -> Vec<&Payment> {
    if self.filter.is_empty() {
      return self.payments.iter().collect();
    }
    let matcher = SkimMatcherV2::default();
    self
      .payments
      .iter()
      .filter(|p| {
        matcher.fuzzy_match(&p.user_email, &self.filter).is_some()
          || matcher.fuzzy_match(p.plan.as_str(), &self.filter).is_some()
      })
      .collect()
  }

  /// The payment under the list cursor in the filtered view, if any.
  pub fn cursor_payment(&self) -> Option<&Payment> {
    let list = self.filtered_payments();
    list.get(self.list_cursor).copied()
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    // Global: Ctrl-C quits from anywhere.
    if key.modifiers.contains(KeyModifiers::CONTROL)
      && key.code == KeyCode::Char('c')
    {
      return Ok(false);
    }

    // A pending confirmation swallows every key: y executes, all else
    // cancels.
    if let Some((payment_id, decision)) = self.confirm.take() {
      if key.code == KeyCode::Char('y') {
        self.execute_decision(&payment_id, decision).await;
      } else {
        self.status_msg = "Cancelled.".into();
      }
      return Ok(true);
    }

    // Filter input mode: all printable keys go into the filter string.
    if self.filter_active {
      return self.handle_filter_key(key).await;
    }

    match self.screen {
      Screen::PaymentList => self.handle_list_key(key).await,
      Screen::PaymentDetail => self.handle_detail_key(key).await,
    }
  }

  async fn handle_filter_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      KeyCode::Esc => {
        self.filter_active = false;
        self.filter.clear();
        self.list_cursor = 0;
      }
      KeyCode::Enter => {
        self.filter_active = false;
        self.list_cursor = 0;
      }
      KeyCode::Backspace => {
        self.filter.pop();
        self.list_cursor = 0;
      }
      KeyCode::Char(c) => {
        self.filter.push(c);
        self.list_cursor = 0;
      }
      _ => {}
    }
    Ok(true)
  }

  async fn handle_list_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      // Quit
      KeyCode::Char('q') => return Ok(false),

      // Navigation
      KeyCode::Down | KeyCode::Char('j') => {
        let len = self.filtered_payments().len();
        if len > 0 && self.list_cursor + 1 < len {
          self.list_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        if self.list_cursor > 0 {
          self.list_cursor -= 1;
        }
      }

      // Open detail
      KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
        if let Some(payment) = self.cursor_payment().cloned() {
          self.open_detail(payment).await;
        }
      }

      // Decisions (with confirmation)
      KeyCode::Char('v') => self.request_decision(Decision::Verify),
      KeyCode::Char('r') => self.request_decision(Decision::Reject),

      // Reload
      KeyCode::Char('R') => {
        let _ = self.load_payments().await;
      }

      // Filter
      KeyCode::Char('/') => {
        self.filter_active = true;
        self.filter.clear();
        self.list_cursor = 0;
      }

      _ => {}
    }
    Ok(true)
  }

  async fn handle_detail_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      // Quit
      KeyCode::Char('q') => return Ok(false),

      // Back to list
      KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => {
        self.screen = Screen::PaymentList;
        self.selected = None;
        self.trail.clear();
      }

      // Scroll audit trail
      KeyCode::Down | KeyCode::Char('j') => {
        if self.detail_scroll + 1 < self.trail.len() {
          self.detail_scroll += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        if self.detail_scroll > 0 {
          self.detail_scroll -= 1;
        }
      }

      // Decisions work from the detail pane too.
      KeyCode::Char('v') => self.request_decision(Decision::Verify),
      KeyCode::Char('r') => self.request_decision(Decision::Reject),

      _ => {}
    }
    Ok(true)
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  /// Arm the confirmation prompt for the payment in focus.
  fn request_decision(&mut self, decision: Decision) {
    let payment = match self.screen {
      Screen::PaymentDetail => self.selected.as_ref(),
      Screen::PaymentList => self.cursor_payment(),
    };
    if let Some(p) = payment {
      let id = p.payment_id.as_str().to_string();
      self.status_msg = format!(
        "{} {} for {}? [y/N]",
        decision.verb(),
        p.payment_id.display_short(),
        p.user_email
      );
      self.confirm = Some((id, decision));
    }
  }

  async fn execute_decision(&mut self, payment_id: &str, decision: Decision) {
    let result = match decision {
      Decision::Verify => self.client.verify(payment_id).await,
      Decision::Reject => self.client.reject(payment_id).await,
    };
    match result {
      Ok(body) => {
        self.status_msg = body["message"]
          .as_str()
          .unwrap_or("Done.")
          .to_string();
        // The payment left the pending queue; refresh and drop the detail
        // view if it showed the settled payment.
        let _ = self.load_payments().await;
        if self
          .selected
          .as_ref()
          .is_some_and(|p| p.payment_id.as_str() == payment_id)
        {
          self.screen = Screen::PaymentList;
          self.selected = None;
          self.trail.clear();
        }
      }
      Err(e) => {
        self.status_msg = format!("Error: {e}");
      }
    }
  }

  /// Transition to `PaymentDetail` for `payment`, loading its audit trail.
  async fn open_detail(&mut self, payment: Payment) {
    let id = payment.payment_id.as_str().to_string();
    self.load_trail(&id).await;
    self.selected = Some(payment);
    self.screen = Screen::PaymentDetail;
  }
}
