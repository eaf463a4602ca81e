use rand::prelude::IndexedRandom;
use rand::Rng;

const NAMES: &[&str] = &[
    "Aaliyah", "Aaron", "Abigail", "Adam", "Addison", "Adrian", "Aiden", "Alexa", "Alexander",
    "Alexis", "Alice", "Allison", "Alyssa", "Amelia", "Andrew", "Angel", "Anna", "Annabelle",
    "Anthony", "Aria", "Ariana", "Arianna", "Asher", "Ashley", "Aubree", "Aubrey", "Audrey",
    "Aurora", "Austin", "Autumn", "Ava", "Avery", "Ayden", "Bella", "Benjamin", "Bentley",
    "Blake", "Brandon", "Brayden", "Brianna", "Brooklyn", "Caleb", "Cameron", "Camila",
    "Caroline", "Carson", "Carter", "Charles", "Charlotte", "Chase", "Chloe", "Christian",
    "Christopher", "Claire", "Clara", "Colton", "Connor", "Cooper", "Cora", "Daniel", "David",
    "Dominic", "Dylan", "Easton", "Eleanor", "Eli", "Elias", "Elijah", "Elizabeth", "Ella",
    "Ellie", "Emily", "Emma", "Ethan", "Eva", "Evan", "Evelyn", "Ezra", "Faith", "Gabriel",
    "Gabriella", "Gavin", "Genesis", "Gianna", "Grace", "Grayson", "Hailey", "Hannah",
    "Harper", "Hazel", "Henry", "Hudson", "Hunter", "Ian", "Isaac", "Isabella", "Isabelle",
    "Isaiah", "Jace", "Jack", "Jackson", "Jacob", "James", "Jason", "Jaxon", "Jaxson",
    "Jayden", "Jeremiah", "John", "Jonathan", "Jordan", "Jose", "Joseph", "Joshua", "Josiah",
    "Julia", "Julian", "Katherine", "Kayden", "Kaylee", "Kennedy", "Kevin", "Khloe", "Kylie",
    "Landon", "Layla", "Leah", "Leo", "Levi", "Liam", "Lillian", "Lily", "Lincoln", "Logan",
    "Lucas", "Lucy", "Luke", "Lydia", "Mackenzie", "Madeline", "Madelyn", "Madison", "Mason",
    "Mateo", "Matthew", "Maya", "Melanie", "Mia", "Michael", "Mila", "Naomi", "Natalie",
    "Nathan", "Nathaniel", "Nevaeh", "Nicholas", "Noah", "Nolan", "Nora", "Oliver", "Olivia",
    "Owen", "Paisley", "Parker", "Penelope", "Peyton", "Piper", "Quinn", "Reagan", "Riley",
    "Robert", "Ruby", "Ryan", "Ryder", "Sadie", "Samantha", "Samuel", "Sarah", "Savannah",
    "Sawyer", "Scarlett", "Sebastian", "Serenity", "Skylar", "Sofia", "Sophia", "Stella",
    "Taylor", "Theodore", "Thomas", "Tyler", "Victoria", "Violet", "Vivian", "William",
    "Wyatt", "Xavier", "Zachary", "Zoe", "Zoey",
];

/// Three random first names, so concurrent sessions are easy to tell apart in logs.
pub fn display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..3)
        .filter_map(|_| NAMES.choose(&mut *rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_display_name_has_three_known_names() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = display_name(&mut rng);
        let parts: Vec<&str> = name.split(' ').collect();

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| NAMES.contains(part)));
    }
}
