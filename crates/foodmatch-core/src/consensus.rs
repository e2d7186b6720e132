//! Agreement tallies.
//!
//! - [`unanimous`]: places liked by every current member
//! - [`scores`]: every liked place ranked by share of members
//! - [`render_scores`]: the ranked list as text, one line per place

use std::cmp::Ordering;

use crate::types::{AgreementScore, Place, Session};

/// Places whose like count equals the member count.
///
/// Places still in the candidate list come first, in candidate order; places
/// that left it after a refresh follow in the order they were first liked.
pub fn unanimous(session: &Session) -> Vec<Place> {
    let members = session.members.len();
    let agreed: Vec<&Place> = session
        .agreements
        .iter()
        .filter(|a| !a.voters.is_empty() && a.voters.len() == members)
        .map(|a| &a.place)
        .collect();

    let mut places: Vec<Place> = session
        .candidates
        .iter()
        .filter(|c| agreed.iter().any(|p| p.place_id == c.place_id))
        .cloned()
        .collect();

    places.extend(
        agreed
            .into_iter()
            .filter(|p| session.candidate(&p.place_id).is_none())
            .cloned(),
    );

    places
}

/// Liked places ranked by agreement, highest first.
///
/// Ties keep the order in which places were first liked.
pub fn scores(session: &Session) -> Vec<AgreementScore> {
    let members = session.members.len();
    let mut scores: Vec<AgreementScore> = session
        .agreements
        .iter()
        .filter(|a| !a.voters.is_empty())
        .map(|a| AgreementScore {
            place: a.place.clone(),
            votes: a.voters.len(),
            members,
            percent: percent(a.voters.len(), members),
        })
        .collect();

    // Stable sort keeps insertion order among equal scores
    scores.sort_by(|a, b| b.percent.partial_cmp(&a.percent).unwrap_or(Ordering::Equal));
    scores
}

fn percent(votes: usize, members: usize) -> f64 {
    if members == 0 {
        return 0.0;
    }
    votes as f64 / members as f64 * 100.0
}

/// Format scores as `"<name> - <pct>% agreed"` lines.
pub fn render_scores(scores: &[AgreementScore]) -> String {
    scores
        .iter()
        .map(|s| format!("{} - {:.0}% agreed\n", s.place.name, s.percent))
        .collect()
}
