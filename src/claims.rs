//! The lucky-number board: who may pick, what is taken, and the confirm dialog.
//!
//! One claim per claimant is enforced here, on the client. The store is an
//! append-only log with no uniqueness check, and the re-fetch before an append
//! only narrows the window in which two claimants can take the same number.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use claim_ledger::{ClaimSnapshot, ClaimStore, StoreError};
use tracing::{debug, info, warn};

use crate::auth::AuthState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejection {
    AlreadyChosen(u32),
    AlreadyTaken(u32),
    SignInRequired,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Closed,
    Confirm(u32),
    Success(u32),
    Error(ClaimRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The confirm dialog is open for this number.
    Confirming(u32),
    AlreadyChosen { own: u32 },
    AlreadyTaken(u32),
    SignInRequired,
    OutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(u32),
    /// Someone else holds the number.
    Conflict(u32),
    AlreadyClaimedBySelf(u32),
    Unavailable(String),
    SignInRequired,
    NothingSelected,
    OutOfRange(u32),
}

impl ClaimOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellView {
    pub number: u32,
    pub claimed: bool,
    pub own: bool,
    pub hovered: bool,
    pub selectable: bool,
}

pub struct ClaimBoard<S> {
    store: S,
    auth: AuthState,
    range: RangeInclusive<u32>,
    claimed: BTreeSet<u32>,
    own_claim: Option<u32>,
    hovered: Option<u32>,
    dialog: Dialog,
}

impl<S: ClaimStore> ClaimBoard<S> {
    pub fn new(store: S, range: RangeInclusive<u32>) -> Self {
        Self {
            store,
            auth: AuthState::loading(),
            range,
            claimed: BTreeSet::new(),
            own_claim: None,
            hovered: None,
            dialog: Dialog::Closed,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn set_auth(&mut self, auth: AuthState) {
        if let Some(error) = &auth.auth_error {
            warn!(error = %error, "sign-in rejected");
        }
        if auth.claimant() != self.auth.claimant() {
            self.own_claim = None;
            self.hovered = None;
            self.dialog = Dialog::Closed;
        }
        self.auth = auth;
    }

    /// Polling only makes sense for a signed-in claimant.
    pub fn should_poll(&self) -> bool {
        self.auth.claimant().is_some()
    }

    pub fn claimed(&self) -> &BTreeSet<u32> {
        &self.claimed
    }

    pub fn own_claim(&self) -> Option<u32> {
        self.own_claim
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    pub fn hovered(&self) -> Option<u32> {
        self.hovered
    }

    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        let snapshot = self.store.fetch_claimed().await?;
        self.apply(&snapshot);
        Ok(())
    }

    fn apply(&mut self, snapshot: &ClaimSnapshot) {
        let claimed: BTreeSet<u32> = snapshot
            .claimed
            .iter()
            .copied()
            .filter(|n| self.range.contains(n))
            .collect();
        if claimed != self.claimed {
            debug!(count = claimed.len(), "claimed numbers updated");
        }
        self.claimed = claimed;
        if self.own_claim.is_none() {
            if let Some(own) = self.auth.claimant().and_then(|name| self.own_in(snapshot, name)) {
                info!(number = own, "found earlier claim for this claimant");
                self.own_claim = Some(own);
            }
        }
    }

    /// Claims outside the board's range are ignored, whatever the store projected.
    fn own_in(&self, snapshot: &ClaimSnapshot, claimant: &str) -> Option<u32> {
        snapshot
            .number_for(claimant)
            .filter(|number| self.range.contains(number))
    }

    fn selectable(&self, number: u32) -> bool {
        self.auth.claimant().is_some()
            && self.own_claim.is_none()
            && self.range.contains(&number)
            && !self.claimed.contains(&number)
    }

    /// Pointer moved over `number` (or off the board). Ignored while a dialog is open.
    pub fn hover(&mut self, number: Option<u32>) -> Option<u32> {
        if self.dialog != Dialog::Closed || self.auth.claimant().is_none() {
            return self.hovered;
        }
        self.hovered = number.filter(|n| self.selectable(*n));
        self.hovered
    }

    pub fn select_number(&mut self, number: u32) -> SelectOutcome {
        if self.auth.claimant().is_none() {
            self.dialog = Dialog::Error(ClaimRejection::SignInRequired);
            return SelectOutcome::SignInRequired;
        }
        if !self.range.contains(&number) {
            return SelectOutcome::OutOfRange(number);
        }
        if let Some(own) = self.own_claim {
            self.dialog = Dialog::Error(ClaimRejection::AlreadyChosen(own));
            return SelectOutcome::AlreadyChosen { own };
        }
        if self.claimed.contains(&number) {
            self.dialog = Dialog::Error(ClaimRejection::AlreadyTaken(number));
            return SelectOutcome::AlreadyTaken(number);
        }
        self.dialog = Dialog::Confirm(number);
        SelectOutcome::Confirming(number)
    }

    /// Confirms whatever number the dialog currently holds for the signed-in claimant.
    pub async fn confirm_selected(&mut self) -> ClaimOutcome {
        let Dialog::Confirm(number) = self.dialog else {
            return ClaimOutcome::NothingSelected;
        };
        let Some(claimant) = self.auth.claimant().map(str::to_string) else {
            self.dialog = Dialog::Error(ClaimRejection::SignInRequired);
            return ClaimOutcome::SignInRequired;
        };
        self.confirm_claim(number, &claimant).await
    }

    /// Re-reads the claim log, then appends `number` for `claimant` if it is still free.
    pub async fn confirm_claim(&mut self, number: u32, claimant: &str) -> ClaimOutcome {
        if !self.range.contains(&number) {
            debug!(number, range = ?self.range, "claim outside the board; refusing");
            self.dialog = Dialog::Closed;
            return ClaimOutcome::OutOfRange(number);
        }
        if let Some(own) = self.own_claim {
            self.dialog = Dialog::Error(ClaimRejection::AlreadyChosen(own));
            return ClaimOutcome::AlreadyClaimedBySelf(own);
        }
        let snapshot = match self.store.fetch_claimed().await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.unavailable(err.to_string()),
        };
        self.apply(&snapshot);
        if let Some(own) = self.own_in(&snapshot, claimant) {
            self.own_claim = Some(own);
            self.dialog = Dialog::Error(ClaimRejection::AlreadyChosen(own));
            return ClaimOutcome::AlreadyClaimedBySelf(own);
        }
        if snapshot.is_claimed(number) {
            info!(number, "number was taken in the meantime");
            self.dialog = Dialog::Error(ClaimRejection::AlreadyTaken(number));
            return ClaimOutcome::Conflict(number);
        }
        match self.store.append_claim(number, claimant).await {
            Ok(receipt) if receipt.success => {
                info!(number, claimant, "claim recorded");
                self.claimed.insert(number);
                self.own_claim = Some(number);
                self.hovered = None;
                self.dialog = Dialog::Success(number);
                ClaimOutcome::Claimed(number)
            }
            Ok(_) => self.unavailable("claim was not recorded".to_string()),
            Err(err) => self.unavailable(err.to_string()),
        }
    }

    fn unavailable(&mut self, message: String) -> ClaimOutcome {
        warn!(error = %message, "claim store unavailable");
        self.dialog = Dialog::Error(ClaimRejection::Unavailable(message.clone()));
        ClaimOutcome::Unavailable(message)
    }

    pub fn dismiss(&mut self) {
        self.dialog = Dialog::Closed;
    }

    pub fn cells(&self) -> Vec<CellView> {
        self.range
            .clone()
            .map(|number| CellView {
                number,
                claimed: self.claimed.contains(&number),
                own: self.own_claim == Some(number),
                hovered: self.hovered == Some(number),
                selectable: self.selectable(number),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserProfile;
    use claim_ledger::{ClaimRecord, MemoryClaimStore};
    use std::sync::Arc;

    fn signed_in(name: &str) -> AuthState {
        AuthState::from_profile(
            &UserProfile {
                sub: "1".into(),
                name: name.into(),
                email: format!("{}@example.org", name.to_lowercase()),
                picture: None,
            },
            None,
        )
    }

    fn board(records: Vec<ClaimRecord>) -> ClaimBoard<Arc<MemoryClaimStore>> {
        let store = Arc::new(MemoryClaimStore::with_records(records));
        let mut board = ClaimBoard::new(store, 1..=100);
        board.set_auth(signed_in("Alice"));
        board
    }

    #[tokio::test]
    async fn signed_out_users_cannot_select() {
        let mut board = ClaimBoard::new(Arc::new(MemoryClaimStore::new()), 1..=100);
        board.set_auth(AuthState::signed_out());
        assert_eq!(board.select_number(3), SelectOutcome::SignInRequired);
        assert!(!board.should_poll());
        assert_eq!(board.hover(Some(3)), None);
    }

    #[tokio::test]
    async fn taken_numbers_are_rejected_on_select() {
        let mut board = board(vec![ClaimRecord::new(9, "Bob")]);
        board.refresh().await.unwrap();
        assert_eq!(board.select_number(9), SelectOutcome::AlreadyTaken(9));
        assert_eq!(board.dialog(), &Dialog::Error(ClaimRejection::AlreadyTaken(9)));
        assert_eq!(board.select_number(0), SelectOutcome::OutOfRange(0));
    }

    #[tokio::test]
    async fn earlier_claim_is_detected_on_refresh() {
        let mut board = board(vec![ClaimRecord::new(12, "Alice")]);
        board.refresh().await.unwrap();
        assert_eq!(board.own_claim(), Some(12));
        assert_eq!(board.select_number(40), SelectOutcome::AlreadyChosen { own: 12 });
    }

    #[tokio::test]
    async fn confirm_records_claim_once() {
        let mut board = board(Vec::new());
        assert_eq!(board.select_number(7), SelectOutcome::Confirming(7));
        assert_eq!(board.confirm_selected().await, ClaimOutcome::Claimed(7));
        assert_eq!(board.dialog(), &Dialog::Success(7));
        assert_eq!(board.store().records().len(), 1);

        board.dismiss();
        assert_eq!(board.select_number(8), SelectOutcome::AlreadyChosen { own: 7 });
        assert_eq!(
            board.confirm_claim(8, "Alice").await,
            ClaimOutcome::AlreadyClaimedBySelf(7)
        );
        assert_eq!(board.store().records().len(), 1);
    }

    #[tokio::test]
    async fn store_outage_is_a_generic_error() {
        let mut board = board(Vec::new());
        board.select_number(5);
        board.store().set_offline(true);
        let outcome = board.confirm_selected().await;
        assert!(matches!(outcome, ClaimOutcome::Unavailable(_)));
        assert!(matches!(
            board.dialog(),
            Dialog::Error(ClaimRejection::Unavailable(_))
        ));
        assert_eq!(board.own_claim(), None);
    }

    #[tokio::test]
    async fn confirm_without_dialog_does_nothing() {
        let mut board = board(Vec::new());
        assert_eq!(board.confirm_selected().await, ClaimOutcome::NothingSelected);
    }

    #[tokio::test]
    async fn hover_ignores_taken_numbers_and_open_dialogs() {
        let mut board = board(vec![ClaimRecord::new(2, "Bob")]);
        board.refresh().await.unwrap();
        assert_eq!(board.hover(Some(2)), None);
        assert_eq!(board.hover(Some(3)), Some(3));
        board.select_number(3);
        assert_eq!(board.hover(Some(4)), Some(3));
        let cells = board.cells();
        assert_eq!(cells.len(), 100);
        assert!(cells[1].claimed && !cells[1].selectable);
    }
}
