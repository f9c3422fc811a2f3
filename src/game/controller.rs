//! Per-round controller task
//!
//! One [`GameController`] task owns a round: its [`RoundLifecycle`], the
//! game's rules, and the controller's own deadlines (scenario request, host
//! turn, hint). The task sleeps until the earliest deadline or the next
//! command, so every timer of the round lives in one place and dies with the
//! task. Callers drive the round through a [`RoundHandle`].

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{GameConfig, GameRules, JudgeContext, Judgement, Verdict};
use crate::capability::{AudioSession, HostAgent, Scenario};
use crate::clock::Clock;
use crate::host::HostNotification;
use crate::ptt::{CloseOutcome, OpenOutcome, PushToTalkCoordinator};
use crate::round::{EndOutcome, RoundEvent, RoundLifecycle, RoundPhase, RoundResult, RoundState, RoundView};
use crate::transcript::{Role, TranscriptAggregator, TranscriptEntry};
use crate::{Error, Result};

const STILL_CONNECTING: &str = "Still connecting to the game host...";
const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Environment a round runs against
#[derive(Clone)]
pub struct Capabilities {
    /// AI host
    pub host: Arc<dyn HostAgent>,
    /// Realtime audio session
    pub audio: Arc<dyn AudioSession>,
    /// Transcript shared with the speech-to-text stream
    pub transcript: Arc<TranscriptAggregator>,
    /// Time base shared with transcript producers
    pub clock: Arc<dyn Clock>,
}

/// Outcome of one push-to-talk turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkTurn {
    /// Latest player entry since the window opened
    pub utterance: Option<TranscriptEntry>,
    /// What the rules made of it
    pub judgement: Judgement,
}

enum Command {
    StartTimer(oneshot::Sender<Result<()>>),
    UpdateScore(u32),
    UpdateMessage(String),
    Finish(Verdict, oneshot::Sender<Result<EndOutcome>>),
    Judge(Option<String>, oneshot::Sender<Result<Judgement>>),
    RequestScenario(oneshot::Sender<Result<()>>),
    Host(HostNotification),
    ScenarioReady(Result<Scenario>),
}

/// Task that runs one round of a game
pub struct GameController {
    game: GameConfig,
    rules: Box<dyn GameRules>,
    host: Arc<dyn HostAgent>,
    ptt: Arc<PushToTalkCoordinator>,
    lifecycle: RoundLifecycle,
    scenario: Option<Scenario>,
    scenario_at: Option<Instant>,
    scenario_in_flight: bool,
    host_turn_at: Option<Instant>,
    talk_window_open: bool,
    hint_at: Option<Instant>,
    hint_shown: bool,
    commands: mpsc::Sender<Command>,
    view: watch::Sender<RoundView>,
    result: watch::Sender<Option<RoundResult>>,
    events: broadcast::Sender<RoundEvent>,
    cancel: CancellationToken,
}

impl GameController {
    /// Mount a round and start its countdown
    ///
    /// The scenario is requested from the host after the game's scenario
    /// delay. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the round cannot be started
    pub fn spawn(
        game: GameConfig,
        rules: Box<dyn GameRules>,
        caps: Capabilities,
    ) -> Result<RoundHandle> {
        let now = Instant::now();
        let mut lifecycle = RoundLifecycle::new(&game.title, &game.instructions, game.end_timing);
        lifecycle.start(game.duration_secs, now)?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view_rx) = watch::channel(lifecycle.view(false));
        let (result_tx, result_rx) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let ptt = Arc::new(PushToTalkCoordinator::new(caps.audio, caps.clock));

        tracing::info!(
            game = %game.id,
            duration_secs = game.duration_secs,
            "round mounted"
        );

        let controller = Self {
            scenario_at: Some(now + game.scenario_delay),
            game,
            rules,
            host: caps.host,
            ptt: Arc::clone(&ptt),
            lifecycle,
            scenario: None,
            scenario_in_flight: false,
            host_turn_at: None,
            talk_window_open: false,
            hint_at: None,
            hint_shown: false,
            commands: command_tx.clone(),
            view: view_tx,
            result: result_tx,
            events: events_tx.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(controller.run(command_rx));

        Ok(RoundHandle {
            commands: command_tx,
            view: view_rx,
            result: result_rx,
            events: events_tx,
            ptt,
            transcript: caps.transcript,
            cancel,
            task: Some(task),
        })
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let cancel = self.cancel.clone();

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },

                () = sleep_until(deadline) => self.on_deadline(Instant::now()),
            }

            self.publish();
        }

        self.lifecycle.teardown();
        self.talk_window_open = false;
        self.view
            .send_replace(self.lifecycle.view(self.talk_window_open));

        // Nothing can close a capture once the round is gone
        let ptt = Arc::clone(&self.ptt);
        if ptt.session().is_open {
            tracing::debug!("closing talk window left open at teardown");
            if let Err(e) = ptt.close().await {
                tracing::error!(error = %e, "failed to stop capture at teardown");
            }
        }
        tracing::debug!(game = %self.game.id, "round controller stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.lifecycle.next_deadline(),
            self.scenario_at,
            self.host_turn_at,
            self.hint_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn on_deadline(&mut self, now: Instant) {
        self.lifecycle.advance(now);

        if self.scenario_at.is_some_and(|at| at <= now) {
            self.scenario_at = None;
            self.request_scenario();
        }
        if self.host_turn_at.is_some_and(|at| at <= now) {
            self.host_turn_at = None;
            self.open_talk_window(now);
        }
        if self.hint_at.is_some_and(|at| at <= now) {
            self.hint_at = None;
            self.show_hint();
        }
    }

    fn handle(&mut self, command: Command) {
        let now = Instant::now();

        match command {
            Command::StartTimer(reply) => {
                let _ = reply.send(self.lifecycle.start_timer(now));
            }
            Command::UpdateScore(score) => self.lifecycle.update_score(score),
            Command::UpdateMessage(message) => self.lifecycle.update_message(message),
            Command::Finish(verdict, reply) => {
                let _ = reply.send(self.finish(verdict, now));
            }
            Command::Judge(utterance, reply) => {
                let _ = reply.send(Ok(self.judge(utterance, now)));
            }
            Command::RequestScenario(reply) => {
                self.scenario_at = None;
                if self.scenario.is_none() {
                    self.request_scenario();
                }
                let _ = reply.send(Ok(()));
            }
            Command::Host(HostNotification::ScenarioStarted(scenario)) => {
                self.accept_scenario(scenario, now);
            }
            Command::Host(HostNotification::RoundFinished(verdict)) => {
                if let Err(e) = self.finish(verdict, now) {
                    tracing::warn!(error = %e, "host finish notification rejected");
                }
            }
            Command::ScenarioReady(Ok(scenario)) => {
                self.scenario_in_flight = false;
                self.accept_scenario(scenario, now);
            }
            Command::ScenarioReady(Err(e)) => {
                self.scenario_in_flight = false;
                self.scenario_failed(&e, now);
            }
        }
    }

    fn request_scenario(&mut self) {
        if self.scenario_in_flight || self.lifecycle.phase().is_terminal() {
            return;
        }
        self.scenario_in_flight = true;
        tracing::debug!(game = %self.game.id, "requesting scenario");

        let host = Arc::clone(&self.host);
        let game = self.game.clone();
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let scenario = tokio::select! {
                () = cancel.cancelled() => return,
                scenario = host.request_scenario(&game) => scenario,
            };
            let _ = commands.send(Command::ScenarioReady(scenario)).await;
        });
    }

    fn accept_scenario(&mut self, scenario: Scenario, now: Instant) {
        if self.scenario.is_some() {
            tracing::debug!(id = %scenario.id, "scenario already set, ignoring");
            return;
        }
        if self.lifecycle.phase().is_terminal() || self.lifecycle.is_ending() {
            tracing::debug!(id = %scenario.id, "round over, ignoring scenario");
            return;
        }

        tracing::info!(game = %self.game.id, id = %scenario.id, "scenario started");
        if let Some(message) = self.rules.on_scenario(&scenario) {
            self.lifecycle.update_message(message);
        }
        self.scenario = Some(scenario);
        self.schedule_host_turn(now);
    }

    fn scenario_failed(&mut self, error: &Error, now: Instant) {
        tracing::error!(game = %self.game.id, error = %error, "scenario request failed");
        if self.lifecycle.phase().is_terminal() {
            return;
        }

        self.lifecycle.update_message(STILL_CONNECTING);
        if let Err(e) = self.lifecycle.start_timer(now) {
            tracing::warn!(error = %e, "could not start timer after scenario failure");
        }
    }

    /// Start the host's turn once both the scenario and play are ready
    fn schedule_host_turn(&mut self, now: Instant) {
        let ready = self.scenario.is_some()
            && self.lifecycle.phase() == RoundPhase::Playing
            && !self.lifecycle.is_ending()
            && !self.talk_window_open
            && self.host_turn_at.is_none();

        if ready {
            tracing::debug!(delay = ?self.game.host_speaking_delay, "host turn started");
            self.host_turn_at = Some(now + self.game.host_speaking_delay);
        }
    }

    fn open_talk_window(&mut self, now: Instant) {
        if self.lifecycle.phase() != RoundPhase::Playing || self.lifecycle.is_ending() {
            return;
        }

        self.talk_window_open = true;
        tracing::debug!(game = %self.game.id, "talk window opened");
        self.emit(RoundEvent::TalkWindowOpened);

        if let Err(e) = self.lifecycle.start_timer(now) {
            tracing::warn!(error = %e, "could not start round timer");
        }
        if let Some(hint) = &self.game.hint
            && !self.hint_shown
        {
            self.hint_at = Some(now + hint.after);
        }
    }

    fn show_hint(&mut self) {
        let Some(hint) = &self.game.hint else {
            return;
        };
        if !self.talk_window_open || self.lifecycle.is_ending() {
            return;
        }

        let text = self
            .scenario
            .as_ref()
            .and_then(|s| s.extra.get("hint"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| hint.text.clone(), ToString::to_string);

        tracing::debug!(hint = %text, "hint shown");
        self.hint_shown = true;
        self.lifecycle.update_message(format!("Hint: {text}"));
        self.say(format!("Here's a hint: {text}"));
        self.emit(RoundEvent::HintShown { hint: text });
    }

    fn judge(&mut self, utterance: Option<String>, now: Instant) -> Judgement {
        if self.lifecycle.phase() != RoundPhase::Playing || self.lifecycle.is_ending() {
            tracing::debug!(phase = %self.lifecycle.phase(), "round not accepting answers");
            return Judgement::Undecided;
        }

        let judgement = self.rules.judge(&JudgeContext {
            utterance: utterance.as_deref(),
            scenario: self.scenario.as_ref(),
            hint_shown: self.hint_shown,
            state: self.lifecycle.state(),
        });

        match &judgement {
            Judgement::Undecided => tracing::debug!("utterance left to the host"),
            Judgement::Progress { score, message } => {
                self.lifecycle.update_score(*score);
                self.lifecycle.update_message(message.clone());
            }
            Judgement::Finish(verdict) => {
                if let Err(e) = self.finish(verdict.clone(), now) {
                    tracing::warn!(error = %e, "verdict rejected");
                }
            }
        }

        judgement
    }

    fn finish(&mut self, verdict: Verdict, now: Instant) -> Result<EndOutcome> {
        self.lifecycle
            .end(verdict.success, verdict.message, verdict.score, now)
    }

    /// Forward text to the host without waiting for it
    fn say(&self, text: String) {
        let host = Arc::clone(&self.host);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                sent = host.send_player_text(&text) => {
                    if let Err(e) = sent {
                        tracing::error!(error = %e, "failed to send text to host");
                    }
                }
            }
        });
    }

    /// Stop a capture the player is still holding open
    fn release_talk(&self) {
        if !self.ptt.session().is_open {
            return;
        }

        tracing::debug!("round ending, closing talk window");
        let ptt = Arc::clone(&self.ptt);
        tokio::spawn(async move {
            if let Err(e) = ptt.close().await {
                tracing::error!(error = %e, "failed to stop capture at round end");
            }
        });
    }

    fn emit(&self, event: RoundEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&mut self) {
        for event in self.lifecycle.take_events() {
            match &event {
                RoundEvent::RoundBegins { announcement } => {
                    self.say(announcement.clone());
                    self.schedule_host_turn(Instant::now());
                }
                RoundEvent::EndSequenceStarted { .. } => {
                    self.talk_window_open = false;
                    self.release_talk();
                    self.host_turn_at = None;
                    self.hint_at = None;
                    self.scenario_at = None;
                }
                _ => {}
            }
            self.emit(event);
        }

        self.view
            .send_replace(self.lifecycle.view(self.talk_window_open));

        if let Some(result) = self.lifecycle.result()
            && self.result.borrow().is_none()
        {
            self.result.send_replace(Some(result.clone()));
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Caller's handle on a running round
///
/// Dropping the handle tears the round down, cancels every pending timer and
/// stops a capture left open.
pub struct RoundHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RoundView>,
    result: watch::Receiver<Option<RoundResult>>,
    events: broadcast::Sender<RoundEvent>,
    ptt: Arc<PushToTalkCoordinator>,
    transcript: Arc<TranscriptAggregator>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RoundHandle {
    /// Current round state
    #[must_use]
    pub fn state(&self) -> RoundState {
        self.view.borrow().state.clone()
    }

    /// Current presentation snapshot
    #[must_use]
    pub fn view(&self) -> RoundView {
        self.view.borrow().clone()
    }

    /// Watch presentation snapshots
    #[must_use]
    pub fn watch_view(&self) -> watch::Receiver<RoundView> {
        self.view.clone()
    }

    /// Subscribe to round events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }

    /// Final result, once committed
    #[must_use]
    pub fn result(&self) -> Option<RoundResult> {
        self.result.borrow().clone()
    }

    /// Push-to-talk coordinator for this round
    #[must_use]
    pub const fn ptt(&self) -> &Arc<PushToTalkCoordinator> {
        &self.ptt
    }

    /// Transcript the round reads utterances from
    #[must_use]
    pub const fn transcript(&self) -> &Arc<TranscriptAggregator> {
        &self.transcript
    }

    /// Whether the round has been torn down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Let the round timer run
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` outside `Countdown` and `Playing`,
    /// or `Error::RoundClosed` after teardown
    pub async fn start_timer(&self) -> Result<()> {
        self.call(Command::StartTimer).await
    }

    /// Replace the round's score
    ///
    /// # Errors
    ///
    /// Returns `Error::RoundClosed` after teardown
    pub async fn update_score(&self, score: u32) -> Result<()> {
        self.send(Command::UpdateScore(score)).await
    }

    /// Replace the status message
    ///
    /// # Errors
    ///
    /// Returns `Error::RoundClosed` after teardown
    pub async fn update_message(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::UpdateMessage(message.into())).await
    }

    /// End the round
    ///
    /// # Errors
    ///
    /// Returns `Error::OrderingViolation` outside `Playing`, or
    /// `Error::RoundClosed` after teardown
    pub async fn finish(&self, verdict: Verdict) -> Result<EndOutcome> {
        self.call(|reply| Command::Finish(verdict, reply)).await
    }

    /// Deliver a decoded host notification
    ///
    /// # Errors
    ///
    /// Returns `Error::RoundClosed` after teardown
    pub async fn notify(&self, notification: HostNotification) -> Result<()> {
        self.send(Command::Host(notification)).await
    }

    /// Ask the host for a scenario now
    ///
    /// A no-op once a scenario is known or while a request is in flight.
    ///
    /// # Errors
    ///
    /// Returns `Error::RoundClosed` after teardown
    pub async fn request_scenario(&self) -> Result<()> {
        self.call(Command::RequestScenario).await
    }

    /// Press the talk button
    ///
    /// Returns `OpenOutcome::Unavailable` before the talk window opens.
    /// When the audio session is not ready yet, the round shows a
    /// still-connecting message.
    ///
    /// # Errors
    ///
    /// Returns error if the audio capability fails to start capture
    pub async fn open_talk(&self) -> Result<OpenOutcome> {
        if self.is_closed() {
            return Err(Error::RoundClosed);
        }
        if !self.view.borrow().talk_window_open {
            tracing::debug!("talk window not open yet");
            return Ok(OpenOutcome::Unavailable);
        }

        let outcome = self.ptt.open().await?;
        if outcome == OpenOutcome::Unavailable {
            self.update_message(STILL_CONNECTING).await?;
        }
        Ok(outcome)
    }

    /// Release the talk button and judge what was said
    ///
    /// # Errors
    ///
    /// Returns error if the audio capability fails to stop capture, or
    /// `Error::RoundClosed` after teardown
    pub async fn close_talk(&self) -> Result<TalkTurn> {
        let CloseOutcome::Closed { opened_at_ms } = self.ptt.close().await? else {
            return Ok(TalkTurn {
                utterance: None,
                judgement: Judgement::Undecided,
            });
        };

        let utterance = self.transcript.latest_since(Role::Player, opened_at_ms);
        tracing::debug!(
            opened_at_ms,
            heard = utterance.as_ref().map(|e| e.text.as_str()),
            "talk window closed"
        );

        let text = utterance.as_ref().map(|e| e.text.clone());
        let judgement = self.call(|reply| Command::Judge(text, reply)).await?;

        Ok(TalkTurn {
            utterance,
            judgement,
        })
    }

    /// Wait for the round's result
    ///
    /// # Errors
    ///
    /// Returns `Error::RoundClosed` if the round is torn down first
    pub async fn wait_finished(&self) -> Result<RoundResult> {
        let mut result = self.result.clone();
        let done = result
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::RoundClosed)?;
        done.clone().ok_or(Error::RoundClosed)
    }

    /// Tear the round down and wait for its task to stop
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "round controller task failed");
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(Error::RoundClosed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::RoundClosed)
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| Error::RoundClosed)?
    }
}

impl Drop for RoundHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for RoundHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundHandle")
            .field("view", &*self.view.borrow())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
