//! Seeded in-memory database shared by the test suites

use crate::database::{initialize_in_memory_pool, DatabasePool};
use crate::models::{BranchInput, NewUser, PatientInput, Role};
use crate::repository::{BranchRepository, OwnerRepository, PatientRepository, UserRepository};
use chrono::NaiveDate;

/// Two branches, one vet in the first, one owner with a dog named Luna
pub struct Fixture {
    pub pool: DatabasePool,
    pub branch_id: i64,
    pub other_branch_id: i64,
    pub vet_id: i64,
    pub owner_user_id: i64,
    pub owner_id: i64,
    pub patient_id: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let pool = initialize_in_memory_pool().expect("in-memory pool");
        let branches = BranchRepository::new(pool.clone());
        let users = UserRepository::new(pool.clone());

        let branch_id = branches
            .create(&BranchInput {
                name: "Centro".to_string(),
                address: "Av. Colón 100".to_string(),
                city: "Córdoba".to_string(),
                phone: "351-400-1000".to_string(),
            })
            .expect("branch")
            .id;
        let other_branch_id = branches
            .create(&BranchInput {
                name: "Norte".to_string(),
                address: "Bv. Los Alemanes 2500".to_string(),
                ..BranchInput::default()
            })
            .expect("branch")
            .id;

        let mut vet = NewUser::basic("lrivas", "hash", Role::Vet);
        vet.first_name = "Laura".to_string();
        vet.last_name = "Rivas".to_string();
        vet.branch_id = Some(branch_id);
        let vet_id = users.create(&vet).expect("vet").id;

        let mut owner = NewUser::basic("ana", "hash", Role::Owner);
        owner.first_name = "Ana".to_string();
        owner.last_name = "Gómez".to_string();
        owner.phone = "351-555-0101".to_string();
        let owner_user_id = users.create(&owner).expect("owner").id;
        let owner_id = OwnerRepository::new(pool.clone())
            .get_by_user(owner_user_id)
            .expect("owner lookup")
            .expect("owner profile")
            .id;

        let patient_id = PatientRepository::new(pool.clone())
            .create(
                owner_id,
                &PatientInput {
                    name: "Luna".to_string(),
                    species: "Perro".to_string(),
                    breed: "Mestizo".to_string(),
                    sex: "F".to_string(),
                    birth_date: NaiveDate::from_ymd_opt(2021, 3, 14).expect("date"),
                    vaccines: String::new(),
                    allergies: String::new(),
                },
            )
            .expect("patient")
            .id;

        Self {
            pool,
            branch_id,
            other_branch_id,
            vet_id,
            owner_user_id,
            owner_id,
            patient_id,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
