use std::collections::HashSet;

/// Which population a follow-feed row came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeedSource {
    Followed,
    Public,
}

impl FeedSource {
    pub fn is_following(self) -> bool {
        matches!(self, FeedSource::Followed)
    }
}

/// Rows that can take part in the two-source feed merge.
pub trait FeedMember {
    fn member_id(&self) -> i64;
    fn mark_source(&mut self, source: FeedSource);
}

/// Concatenates both populations, stamping each row with its group.
///
/// A row present in both keeps only its followed copy. The result is unordered;
/// callers sort it by a follow-feed tuple, whose leading `is_following DESC`
/// key places the whole followed group ahead of the public one.
pub fn merge_sources<R, A, B>(followed: A, public: B) -> Vec<R>
where
    R: FeedMember,
    A: IntoIterator<Item = R>,
    B: IntoIterator<Item = R>,
{
    let mut seen = HashSet::new();
    let tagged = followed
        .into_iter()
        .map(|row| (FeedSource::Followed, row))
        .chain(public.into_iter().map(|row| (FeedSource::Public, row)));

    let mut merged = Vec::new();
    for (source, mut row) in tagged {
        if seen.insert(row.member_id()) {
            row.mark_source(source);
            merged.push(row);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item {
        id: i64,
        following: Option<bool>,
    }

    impl FeedMember for Item {
        fn member_id(&self) -> i64 {
            self.id
        }

        fn mark_source(&mut self, source: FeedSource) {
            self.following = Some(source.is_following());
        }
    }

    fn item(id: i64) -> Item {
        Item {
            id,
            following: None,
        }
    }

    #[test]
    fn stamps_each_row_with_its_group() {
        let merged = merge_sources(vec![item(1)], vec![item(2)]);
        assert_eq!(
            merged,
            vec![
                Item {
                    id: 1,
                    following: Some(true)
                },
                Item {
                    id: 2,
                    following: Some(false)
                },
            ]
        );
    }

    #[test]
    fn followed_copy_wins_over_public_duplicate() {
        let merged = merge_sources(vec![item(7)], vec![item(7), item(8)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].following, Some(true));
        assert_eq!(merged[1].id, 8);
    }

    #[test]
    fn empty_followed_source_yields_public_rows() {
        let merged = merge_sources(Vec::new(), vec![item(3), item(4)]);
        assert!(merged.iter().all(|row| row.following == Some(false)));
    }
}
