//! Site assignment: grouping events from all datasets into shared binding
//! locations.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::event::builder::Event;

/// A spatial grouping of events believed to represent one binding location.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    /// 1-based site number used in reporting.
    pub site_id: usize,
    /// Running centroid over the member events.
    pub centroid: [f64; 3],
    pub n_events: usize,
}

/// Assign every event to a site, creating sites greedily.
///
/// Events are visited in `(dtag, event_idx)` order; an event joins the
/// first existing site whose running centroid lies within
/// `distance_cutoff`, updating that centroid incrementally, otherwise it
/// opens a new site. A single pass, deterministic for the documented
/// ordering.
pub fn assign_sites(events: &mut [Event], distance_cutoff: f64) -> Vec<Site> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by(|&a, &b| {
        (events[a].dtag.as_str(), events[a].event_idx)
            .cmp(&(events[b].dtag.as_str(), events[b].event_idx))
    });

    let mut sites: Vec<Site> = Vec::new();
    for idx in order {
        let centroid = Point3::new(
            events[idx].centroid[0],
            events[idx].centroid[1],
            events[idx].centroid[2],
        );
        let found = sites.iter_mut().find(|site| {
            let sc = Point3::new(site.centroid[0], site.centroid[1], site.centroid[2]);
            (sc - centroid).norm() <= distance_cutoff
        });
        match found {
            Some(site) => {
                let n = site.n_events as f64;
                for c in 0..3 {
                    site.centroid[c] = (site.centroid[c] * n + events[idx].centroid[c]) / (n + 1.0);
                }
                site.n_events += 1;
                events[idx].site_id = Some(site.site_id);
            }
            None => {
                let site_id = sites.len() + 1;
                sites.push(Site {
                    site_id,
                    centroid: events[idx].centroid,
                    n_events: 1,
                });
                events[idx].site_id = Some(site_id);
            }
        }
    }
    sites
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(dtag: &str, event_idx: usize, centroid: [f64; 3]) -> Event {
        Event {
            dtag: dtag.to_string(),
            event_idx,
            bdc: 0.5,
            score: 1.0,
            centroid,
            n_voxels: 20,
            volume: 20.0,
            peak_z: 4.0,
            site_id: None,
        }
    }

    #[test]
    fn test_nearby_events_share_one_site() {
        let mut events = vec![
            event("a", 1, [10.0, 10.0, 10.0]),
            event("b", 1, [10.5, 10.0, 10.0]),
            event("c", 1, [10.0, 10.6, 10.0]),
        ];
        let sites = assign_sites(&mut events, 1.732);
        assert_eq!(sites.len(), 1);
        assert!(events.iter().all(|e| e.site_id == Some(1)));
        assert_eq!(sites[0].n_events, 3);
    }

    #[test]
    fn test_distant_events_get_distinct_sites() {
        let mut events = vec![
            event("a", 1, [2.0, 2.0, 2.0]),
            event("a", 2, [20.0, 20.0, 20.0]),
        ];
        let sites = assign_sites(&mut events, 1.732);
        assert_eq!(sites.len(), 2);
        assert_eq!(events[0].site_id, Some(1));
        assert_eq!(events[1].site_id, Some(2));
    }

    #[test]
    fn test_assignment_is_order_stable() {
        // same events, different storage order: identical site structure
        let mut forward = vec![
            event("a", 1, [5.0, 5.0, 5.0]),
            event("b", 1, [5.5, 5.0, 5.0]),
            event("c", 1, [30.0, 5.0, 5.0]),
        ];
        let mut reversed: Vec<Event> = forward.iter().rev().cloned().collect();
        let sites_f = assign_sites(&mut forward, 1.732);
        let sites_r = assign_sites(&mut reversed, 1.732);
        assert_eq!(sites_f.len(), sites_r.len());
        for (a, b) in sites_f.iter().zip(sites_r.iter()) {
            assert_eq!(a.n_events, b.n_events);
        }
    }

    #[test]
    fn test_empty_input() {
        let mut events: Vec<Event> = Vec::new();
        assert!(assign_sites(&mut events, 1.732).is_empty());
    }

    #[test]
    fn test_jittered_cloud_within_cutoff_is_one_site() {
        use rand::distributions::{Distribution, Uniform};
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(11);
        let jitter = Uniform::new(-0.4f64, 0.4f64);
        let mut events: Vec<Event> = (0..25)
            .map(|i| {
                event(
                    &format!("d{:02}", i),
                    1,
                    [
                        7.0 + jitter.sample(&mut rng),
                        7.0 + jitter.sample(&mut rng),
                        7.0 + jitter.sample(&mut rng),
                    ],
                )
            })
            .collect();
        let sites = assign_sites(&mut events, 1.732);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].n_events, 25);
    }
}
