use std::collections::BTreeMap;

use mongodb::{
    bson::{doc, from_document},
    ClientSession,
};
use serde::Deserialize;

use crate::{
    error::Result,
    model::{
        common::{CandidateId, Slug},
        db::Vote,
        mongodb::Coll,
    },
};

/// Per-candidate vote counts for one team, derived from the ledger.
///
/// Candidates without votes are simply absent, and count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: BTreeMap<CandidateId, u64>,
    total: u64,
}

impl Tally {
    pub fn count(&self, candidate_id: &str) -> u64 {
        self.counts.get(candidate_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn counts(&self) -> &BTreeMap<CandidateId, u64> {
        &self.counts
    }

    /// Share of the vote as a whole percentage, rounding halves up.
    /// Zero when nobody has voted.
    pub fn percentage(&self, candidate_id: &str) -> u64 {
        percentage(self.count(candidate_id), self.total)
    }

    /// Percentages for each of the given candidates, including those with no votes.
    pub fn percentages<'a>(
        &self,
        candidate_ids: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<CandidateId, u64> {
        candidate_ids
            .into_iter()
            .map(|id| (id.to_string(), self.percentage(id)))
            .collect()
    }
}

fn percentage(count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    // round(100 * count / total), with exact integer half-up rounding.
    (200 * count + total) / (2 * total)
}

/// Total number of votes cast in the team.
pub async fn count_votes(slug: &Slug, votes: &Coll<Vote>) -> Result<u64> {
    Ok(votes
        .count_documents(doc! { "team_slug": slug }, None)
        .await?)
}

#[derive(Deserialize)]
struct CandidateCount {
    #[serde(rename = "_id")]
    candidate_id: CandidateId,
    count: u64,
}

/// Group the team's votes by candidate, reading within `session`.
pub async fn tally_by_candidate(
    slug: &Slug,
    votes: &Coll<Vote>,
    session: &mut ClientSession,
) -> Result<Tally> {
    let pipeline = [
        doc! { "$match": { "team_slug": slug } },
        doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
    ];
    let mut groups = votes.aggregate_with_session(pipeline, None, session).await?;

    let mut tally = Tally::default();
    while let Some(group) = groups.next(session).await {
        match from_document::<CandidateCount>(group?) {
            Ok(group) => {
                tally.total += group.count;
                tally.counts.insert(group.candidate_id, group.count);
            }
            Err(e) => error!("Malformed tally group for team '{slug}': {e}"),
        }
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use rocket::local::asynchronous::Client;

    use super::*;

    use crate::model::db::{NewVote, VoteCore};

    impl Tally {
        fn from_votes<'a>(votes: impl IntoIterator<Item = &'a VoteCore>) -> Self {
            let mut tally = Self::default();
            for vote in votes {
                *tally.counts.entry(vote.candidate_id.clone()).or_default() += 1;
                tally.total += 1;
            }
            tally
        }
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 1), 100);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13); // 12.5
        assert_eq!(percentage(1, 200), 1); // 0.5
        assert_eq!(percentage(1, 201), 0);
    }

    #[test]
    fn independent_rounding_may_not_sum_to_100() {
        let slug = Slug::example();
        let votes = [
            NewVote::example(slug.clone(), "c1", "a@example.com"),
            NewVote::example(slug.clone(), "c2", "b@example.com"),
            NewVote::example(slug.clone(), "c3", "c@example.com"),
        ];
        let tally = Tally::from_votes(&votes);
        let percentages = tally.percentages(["c1", "c2", "c3"]);
        assert_eq!(percentages.values().sum::<u64>(), 99);
    }

    #[test]
    fn zero_vote_candidates_count_as_zero() {
        let slug = Slug::example();
        let votes = [NewVote::example(slug, "c1", "u1@example.com")];
        let tally = Tally::from_votes(&votes);
        assert_eq!(tally.count("c1"), 1);
        assert_eq!(tally.count("c2"), 0);
        assert_eq!(tally.percentage("c1"), 100);
        assert_eq!(tally.percentage("c2"), 0);
        assert_eq!(tally.total(), 1);
        assert!(!tally.counts().contains_key("c2"));
    }

    #[backend_test]
    async fn tally_matches_count(client: Client, new_votes: Coll<NewVote>, votes: Coll<Vote>) {
        let slug = Slug::example();
        let other = Slug::example2();
        new_votes
            .insert_many(
                [
                    NewVote::example(slug.clone(), "c1", "a@example.com"),
                    NewVote::example(slug.clone(), "c1", "b@example.com"),
                    NewVote::example(slug.clone(), "c2", "c@example.com"),
                    NewVote::example(other.clone(), "c2", "a@example.com"),
                ],
                None,
            )
            .await
            .unwrap();

        let db_client = client.rocket().state::<mongodb::Client>().unwrap();
        let mut session = db_client.start_session(None).await.unwrap();

        let tally = tally_by_candidate(&slug, &votes, &mut session).await.unwrap();
        assert_eq!(tally.count("c1"), 2);
        assert_eq!(tally.count("c2"), 1);
        assert_eq!(tally.counts().values().sum::<u64>(), tally.total());
        assert_eq!(count_votes(&slug, &votes).await.unwrap(), tally.total());
        assert_eq!(tally.percentage("c1"), 67);
        assert_eq!(tally.percentage("c2"), 33);

        let empty = tally_by_candidate(&"team-empty".parse().unwrap(), &votes, &mut session)
            .await
            .unwrap();
        assert_eq!(empty, Tally::default());
    }
}
